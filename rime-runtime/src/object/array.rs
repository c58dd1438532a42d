use {
    super::{
        Identity, IndexError, Obj, Segment,
        alloc_object, free_object, release, retain,
    },
    crate::handle::Root,
    std::{
        cell::Cell,
        mem::size_of,
        ptr::{NonNull, addr_of_mut},
        slice,
    },
};

/// An element slot. Empty slots hold `None`.
type Slot = Cell<Option<NonNull<Obj>>>;

/// In-memory representation of array objects.
///
/// Elements are base-typed references stored at the tail of the same
/// allocation. Occupied slots own one reference to their occupant.
#[repr(C)]
pub struct Array
{
    identity: Identity,
    base: Obj,

    /// The number of element slots.
    len: usize,

    /// The element slots.
    items: [Slot; 0 /* len */],
}

unsafe impl Segment for Array
{
    fn identity(&self) -> &Identity
    {
        &self.identity
    }
}

impl Array
{
    /// Create an array of `len` empty slots.
    pub fn new(len: usize) -> Root<Array>
    {
        // SAFETY: new_raw returns a fresh, fully constructed object.
        unsafe { Root::retaining(Self::new_raw(len)) }
    }

    /// Raw constructor: fully initialized, count zero, all slots empty.
    ///
    /// # Safety
    ///
    /// The returned object must be retained before anything can
    /// release it.
    pub unsafe fn new_raw(len: usize) -> NonNull<Array>
    {
        let size = size_of::<Array>() + size_of::<Slot>() * len;
        let ptr = alloc_object(size).cast::<Array>();
        let obj = ptr.as_ptr();

        Identity::init_outermost(ptr.cast(), destroy_array);
        Obj::embed(
            NonNull::new_unchecked(addr_of_mut!((*obj).base)),
            ptr.cast(),
            ptr.cast(),
        );

        addr_of_mut!((*obj).len).write(len);
        let items = addr_of_mut!((*obj).items).cast::<Slot>();
        for index in 0 .. len {
            items.add(index).write(Slot::new(None));
        }

        ptr
    }

    /// The number of element slots.
    pub fn len(&self) -> usize
    {
        self.len
    }

    /// Whether the array has no slots.
    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    /// The capability segment of this array.
    pub fn as_obj(&self) -> &Obj
    {
        &self.base
    }

    /// Bounds-checked element access.
    ///
    /// Empty slots read as `None`; occupied slots yield a new reference
    /// to the occupant.
    pub fn get(&self, index: i64) -> Result<Option<Root<Obj>>, IndexError>
    {
        let slot = self.slot(index)?;
        match slot.get() {
            None => Ok(None),
            // SAFETY: Occupied slots own a reference, so the occupant
            // is live.
            Some(occupant) => Ok(Some(unsafe { Root::retaining(occupant) })),
        }
    }

    /// Bounds-checked element store.
    ///
    /// Retains the new occupant and releases the previous one. On an
    /// out-of-range index the array is left unmodified.
    pub fn set(&self, index: i64, value: Option<&Obj>) -> Result<(), IndexError>
    {
        let slot = self.slot(index)?;

        // Retain before releasing, in case both are the same object.
        let next = value.map(|obj| NonNull::from(retain(obj)));
        let prev = slot.replace(next);
        if let Some(prev) = prev {
            // SAFETY: The slot owned a reference to the occupant.
            unsafe { release(prev.as_ref()) };
        }

        Ok(())
    }

    fn slot(&self, index: i64) -> Result<&Slot, IndexError>
    {
        let offset = usize::try_from(index)
            .ok()
            .filter(|&offset| offset < self.len)
            .ok_or(IndexError{index, len: self.len})?;
        Ok(&self.slots()[offset])
    }

    fn slots(&self) -> &[Slot]
    {
        // SAFETY: len matches the tail allocation.
        unsafe { slice::from_raw_parts(self.items.as_ptr(), self.len) }
    }
}

/// Tear down an array object, releasing every occupant.
unsafe fn destroy_array(outer: NonNull<Identity>)
{
    let this = outer.cast::<Array>();
    {
        let array = this.as_ref();
        for slot in array.slots() {
            if let Some(occupant) = slot.get() {
                release(occupant.as_ref());
            }
        }
    }
    free_object(outer);
}
