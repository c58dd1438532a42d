use {
    super::{Identity, Obj, Segment, Str, alloc_object, free_object},
    crate::handle::Root,
    smallvec::SmallVec,
    std::{
        mem::size_of,
        ptr::{NonNull, addr_of_mut},
    },
};

/// In-memory representation of integer objects.
#[repr(C)]
pub struct Int
{
    identity: Identity,
    base: Obj,
    value: i64,
}

unsafe impl Segment for Int
{
    fn identity(&self) -> &Identity
    {
        &self.identity
    }
}

impl Int
{
    /// Create an integer object.
    pub fn new(value: i64) -> Root<Int>
    {
        // SAFETY: new_raw returns a fresh, fully constructed object.
        unsafe { Root::retaining(Self::new_raw(value)) }
    }

    /// Raw constructor: fully initialized, count zero.
    ///
    /// # Safety
    ///
    /// The returned object must be retained before anything can
    /// release it.
    pub unsafe fn new_raw(value: i64) -> NonNull<Int>
    {
        let ptr = alloc_object(size_of::<Int>()).cast::<Int>();
        let obj = ptr.as_ptr();

        Identity::init_outermost(ptr.cast(), destroy_int);
        Obj::embed(
            NonNull::new_unchecked(addr_of_mut!((*obj).base)),
            ptr.cast(),
            ptr.cast(),
        );

        addr_of_mut!((*obj).value).write(value);

        Obj::install_stringify(
            NonNull::new_unchecked(addr_of_mut!((*obj).base)),
            stringify_int,
        );

        ptr
    }

    /// The integer payload.
    pub fn value(&self) -> i64
    {
        self.value
    }

    /// The capability segment of this integer.
    pub fn as_obj(&self) -> &Obj
    {
        &self.base
    }
}

/// `stringify` renders the decimal representation, including sign.
unsafe fn stringify_int(seg: NonNull<Identity>) -> NonNull<Str>
{
    // Installed by Int's own constructor, so the segment is the integer.
    let this = seg.cast::<Int>();
    let digits = render_decimal(this.as_ref().value);
    Root::into_raw(Str::new(&digits))
}

unsafe fn destroy_int(outer: NonNull<Identity>)
{
    free_object(outer);
}

/// Render `value` in decimal into an inline buffer.
///
/// The buffer fits the longest possible rendering, `i64::MIN`.
fn render_decimal(value: i64) -> SmallVec<[u8; 20]>
{
    let mut digits = SmallVec::<[u8; 20]>::new();

    let mut rest = value.unsigned_abs();
    loop {
        digits.push(b'0' + (rest % 10) as u8);
        rest /= 10;
        if rest == 0 {
            break;
        }
    }

    if value < 0 {
        digits.push(b'-');
    }

    digits.reverse();
    digits
}

#[cfg(test)]
mod tests
{
    use {super::*, proptest::proptest};

    #[test]
    fn stringify_negative()
    {
        let int = Int::new(-42);
        assert_eq!(int.as_obj().stringify().as_bytes(), b"-42");
    }

    #[test]
    fn stringify_extremes()
    {
        let min = Int::new(i64::MIN);
        assert_eq!(
            min.as_obj().stringify().as_bytes(),
            b"-9223372036854775808",
        );

        let zero = Int::new(0);
        assert_eq!(zero.as_obj().stringify().as_bytes(), b"0");
    }

    proptest!
    {
        #[test]
        fn stringify_matches_display(value: i64)
        {
            let int = Int::new(value);
            let text = int.as_obj().stringify();
            assert_eq!(text.as_bytes(), value.to_string().as_bytes());
        }

        #[test]
        fn roundtrip(value: i64)
        {
            assert_eq!(Int::new(value).value(), value);
        }
    }
}
