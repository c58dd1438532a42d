use {
    super::{
        Identity, IndexError, Obj, Segment,
        alloc_object, free_object, retain,
    },
    crate::handle::Root,
    std::{
        fmt,
        mem::size_of,
        ptr::{NonNull, addr_of_mut, copy_nonoverlapping},
        slice,
    },
};

/// In-memory representation of string objects.
///
/// The bytes live at the tail of the same allocation as the segments,
/// so destruction frees a single block.
#[repr(C)]
pub struct Str
{
    identity: Identity,
    base: Obj,

    /// The number of bytes that make up the string.
    len: usize,

    /// The bytes that make up the string.
    bytes: [u8; 0 /* len */],
}

unsafe impl Segment for Str
{
    fn identity(&self) -> &Identity
    {
        &self.identity
    }
}

impl Str
{
    /// Create a string object from the bytes that make it up.
    ///
    /// The bytes are copied into the new allocation, never borrowed.
    pub fn new(bytes: &[u8]) -> Root<Str>
    {
        // SAFETY: new_raw returns a fresh, fully constructed object.
        unsafe { Root::retaining(Self::new_raw(bytes)) }
    }

    /// Raw constructor: fully initialized, count zero.
    ///
    /// Compiled code balances the count itself; Rust-side callers
    /// should prefer [`Str::new`].
    ///
    /// # Safety
    ///
    /// The returned object must be retained before anything can
    /// release it.
    pub unsafe fn new_raw(bytes: &[u8]) -> NonNull<Str>
    {
        let ptr = alloc_object(size_of::<Str>() + bytes.len()).cast::<Str>();
        let obj = ptr.as_ptr();

        Identity::init_outermost(ptr.cast(), destroy_str);
        Obj::embed(
            NonNull::new_unchecked(addr_of_mut!((*obj).base)),
            ptr.cast(),
            ptr.cast(),
        );

        addr_of_mut!((*obj).len).write(bytes.len());
        copy_nonoverlapping(
            bytes.as_ptr(),
            addr_of_mut!((*obj).bytes).cast::<u8>(),
            bytes.len(),
        );

        // Install this type's override last; the outermost write wins.
        Obj::install_stringify(
            NonNull::new_unchecked(addr_of_mut!((*obj).base)),
            stringify_str,
        );

        ptr
    }

    /// The number of bytes in the string.
    pub fn len(&self) -> usize
    {
        self.len
    }

    /// Whether the string is empty.
    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    /// The bytes that make up the string.
    pub fn as_bytes(&self) -> &[u8]
    {
        // SAFETY: len matches the tail allocation.
        unsafe { slice::from_raw_parts(self.bytes.as_ptr(), self.len) }
    }

    /// The capability segment of this string.
    pub fn as_obj(&self) -> &Obj
    {
        &self.base
    }

    /// Bounds-checked byte access, as a new one-character string.
    pub fn byte_at(&self, index: i64) -> Result<Root<Str>, IndexError>
    {
        let offset = usize::try_from(index)
            .ok()
            .filter(|&offset| offset < self.len)
            .ok_or(IndexError{index, len: self.len})?;
        Ok(Self::new(slice::from_ref(&self.as_bytes()[offset])))
    }
}

impl fmt::Debug for Str
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "\"{}\"", self.as_bytes().escape_ascii())
    }
}

/// `stringify` of a string is the string itself, retained.
unsafe fn stringify_str(seg: NonNull<Identity>) -> NonNull<Str>
{
    // Installed by Str's own constructor, so the segment is the string.
    let this = seg.cast::<Str>();
    retain(this.as_ref());
    this
}

/// Tear down a string object. The bytes live in the same block.
unsafe fn destroy_str(outer: NonNull<Identity>)
{
    free_object(outer);
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::object::{IndexError, Segment},
        proptest::{collection::vec as pvec, num::u8::ANY as pu8, proptest},
        std::ptr::NonNull,
    };

    #[test]
    fn stringify_is_identity()
    {
        let string = Str::new(b"abc");
        let text = string.as_obj().stringify();
        assert_eq!(text.as_bytes(), b"abc");
        assert_eq!(
            NonNull::from(text.identity()),
            NonNull::from(string.identity()),
        );
    }

    #[test]
    fn byte_at_in_range()
    {
        let string = Str::new(b"abc");
        let byte = string.byte_at(1).unwrap();
        assert_eq!(byte.as_bytes(), b"b");
    }

    #[test]
    fn byte_at_out_of_range()
    {
        let string = Str::new(b"abc");
        assert_eq!(string.byte_at(3).unwrap_err(), IndexError{index: 3, len: 3});
        assert_eq!(string.byte_at(-1).unwrap_err(), IndexError{index: -1, len: 3});
    }

    proptest!
    {
        #[test]
        fn roundtrip(expected in pvec(pu8, 0 .. 100))
        {
            let string = Str::new(&expected);
            assert_eq!(string.as_bytes(), &expected);
            assert_eq!(string.len(), expected.len());
        }
    }
}
