//! Safe owning references to objects.

use {
    crate::object::{Segment, release, retain},
    std::{fmt, mem::forget, ops::Deref, ptr::NonNull},
};

/// Owning reference to an object, through a typed segment view.
///
/// A root holds exactly one reference count on the object its segment
/// is part of: cloning retains, dropping releases, so Rust-side
/// consumers cannot unbalance the counter. Compiled code uses the raw
/// [`retain`]/[`release`] operations instead and manages pointers
/// directly.
pub struct Root<S>
    where S: Segment
{
    // INVARIANT: References a live segment; owns one reference.
    inner: NonNull<S>,
}

impl<S> Root<S>
    where S: Segment
{
    /// Create a root from a borrowed live segment.
    pub fn of(seg: &S) -> Self
    {
        retain(seg);
        Self{inner: NonNull::from(seg)}
    }

    /// Retain a raw segment and own the new reference.
    ///
    /// This is how constructors adopt a fresh count-zero object.
    ///
    /// # Safety
    ///
    /// The segment must belong to a live (or fresh, fully constructed)
    /// object.
    pub unsafe fn retaining(inner: NonNull<S>) -> Self
    {
        retain(inner.as_ref());
        Self{inner}
    }

    /// Take ownership of a reference that is already counted.
    ///
    /// This is how dispatch wrappers adopt the retained values that
    /// slot functions return.
    ///
    /// # Safety
    ///
    /// The segment must belong to a live object whose count includes
    /// the reference being adopted.
    pub unsafe fn adopt(inner: NonNull<S>) -> Self
    {
        Self{inner}
    }

    /// Give up ownership without releasing.
    ///
    /// The caller becomes responsible for the reference this root
    /// owned. This is how slot implementations return retained values.
    pub fn into_raw(this: Self) -> NonNull<S>
    {
        let inner = this.inner;
        forget(this);
        inner
    }
}

impl<S> Deref for Root<S>
    where S: Segment
{
    type Target = S;

    fn deref(&self) -> &S
    {
        // SAFETY: The root guarantees the segment is live.
        unsafe { self.inner.as_ref() }
    }
}

impl<S> Clone for Root<S>
    where S: Segment
{
    fn clone(&self) -> Self
    {
        Self::of(self)
    }
}

impl<S> Drop for Root<S>
    where S: Segment
{
    fn drop(&mut self)
    {
        // SAFETY: The root owned one reference and is not used again.
        unsafe { release(self.inner.as_ref()) };
    }
}

impl<S> fmt::Debug for Root<S>
    where S: Segment
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        fmt::Debug::fmt(&self.inner, f)
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::object::{Segment as _, Str}};

    #[test]
    fn clone_and_drop_balance()
    {
        let root = Str::new(b"rooted");
        assert_eq!(root.identity().count(), 1);

        let clone = root.clone();
        assert_eq!(root.identity().count(), 2);

        drop(clone);
        assert_eq!(root.identity().count(), 1);
    }

    #[test]
    fn into_raw_keeps_the_reference()
    {
        let root = Str::new(b"kept");
        let raw = Root::into_raw(root);

        // SAFETY: into_raw passed its reference to us.
        let root = unsafe { Root::adopt(raw) };
        assert_eq!(root.identity().count(), 1);
        assert_eq!(root.as_bytes(), b"kept");
    }
}
