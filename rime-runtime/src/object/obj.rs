use {
    super::{Identity, Segment, Str},
    crate::handle::Root,
    std::ptr::{NonNull, addr_of_mut},
};

/// Function installed in the `stringify` dispatch slot.
///
/// The function receives the segment of the class that installed it;
/// when the installing class is the concrete type, that segment is
/// `self_ref`. The returned string is retained, and ownership of that
/// reference passes to the caller.
pub type StringifyFn = unsafe fn(NonNull<Identity>) -> NonNull<Str>;

/// The capability segment every class ultimately embeds.
///
/// This is the minimal polymorphic surface of the object model: one
/// dispatch slot, `stringify`, producing a textual representation.
/// Base-typed handles are references to this segment.
#[repr(C)]
pub struct Obj
{
    identity: Identity,
    stringify: StringifyFn,
}

unsafe impl Segment for Obj
{
    fn identity(&self) -> &Identity
    {
        &self.identity
    }
}

impl Obj
{
    /// Embedding initializer for direct subclasses of the capability
    /// class.
    ///
    /// Wires the segment's identity into the chain of the object rooted
    /// at `outer` and installs the default `stringify`. Subclass
    /// initializers overwrite the slot afterwards; the outermost write
    /// wins.
    ///
    /// # Safety
    ///
    /// `seg` must point at the uninitialized capability segment of the
    /// allocation that starts at `outer`, and `outer` must already be
    /// initialized with [`Identity::init_outermost`].
    pub unsafe fn embed(
        seg: NonNull<Obj>,
        up: NonNull<Identity>,
        outer: NonNull<Identity>,
    )
    {
        Identity::init_embedded(seg.cast(), up, outer);
        addr_of_mut!((*seg.as_ptr()).stringify).write(stringify_obj);
    }

    /// Overwrite the `stringify` dispatch slot.
    ///
    /// Constructors call this after embedding, installing their own
    /// implementation or a redirect thunk.
    ///
    /// # Safety
    ///
    /// `seg` must point at an embedded capability segment under
    /// construction, before any shared references to it exist.
    pub unsafe fn install_stringify(seg: NonNull<Obj>, stringify: StringifyFn)
    {
        addr_of_mut!((*seg.as_ptr()).stringify).write(stringify);
    }

    /// Resolve and invoke the `stringify` capability.
    ///
    /// The slot holds the implementation installed by the most-derived
    /// type and is invoked through `self_ref`, so the override executes
    /// even when this is a base-typed view of a derived object.
    pub fn stringify(&self) -> Root<Str>
    {
        let slot = self.stringify;
        let outer = self.identity.self_ref();

        // SAFETY: The object is live; slot functions return a retained
        // string whose reference we adopt.
        unsafe { Root::adopt(slot(outer)) }
    }
}

/// Default `stringify`: render the object's identity as a hex address.
///
/// Redirect thunks of classes that do not override the capability
/// forward here with their own capability segment.
///
/// # Safety
///
/// `seg` must be a segment of a live object.
pub unsafe fn stringify_obj(seg: NonNull<Identity>) -> NonNull<Str>
{
    let outer = seg.as_ref().self_ref();
    let text = format!("0x{:x}", outer.as_ptr() as usize);
    Root::into_raw(Str::new(text.as_bytes()))
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::{handle::Root, object::{Int, Segment}}};

    #[test]
    fn default_stringify_renders_identity()
    {
        let int = Int::new(7);
        let outer = int.identity().self_ref();

        // SAFETY: The object stays live for the duration of the call.
        let text = unsafe { Root::adopt(stringify_obj(outer)) };

        let expected = format!("0x{:x}", outer.as_ptr() as usize);
        assert_eq!(text.as_bytes(), expected.as_bytes());
    }
}
