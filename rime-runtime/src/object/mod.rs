//! Object layout, the embedding protocol, and the lifecycle operations.
//!
//! # The embedding protocol
//!
//! Every concrete type's constructor must, in order:
//!
//!  1. allocate the full composite structure as one block
//!     (see [`alloc_object`]);
//!  2. initialize the outermost identity with
//!     [`Identity::init_outermost`], which also installs the concrete
//!     type's destructor and the initial count of zero;
//!  3. invoke the base type's embedding initializer (for direct
//!     subclasses of the capability class, [`Obj::embed`]), passing the
//!     base segment, the current segment, and the outermost segment;
//!     the initializer recurses for each ancestor;
//!  4. initialize its own fields;
//!  5. overwrite every dispatch slot it defines or overrides, either
//!     with its own implementation or with a redirect thunk that
//!     re-invokes an ancestor's implementation against the ancestor's
//!     embedded segment.
//!
//! Each level's initializer writes the slots it knows about, so the
//! outermost write wins and a slot always ends up holding the
//! implementation installed by the most-derived type.

pub use self::{array::*, integer::*, obj::*, string::*};

use {
    std::{
        alloc::{Layout, handle_alloc_error},
        cell::Cell,
        mem::align_of,
        process::abort,
        ptr::{NonNull, addr_of, addr_of_mut},
    },
    thiserror::Error,
};

mod array;
mod integer;
mod obj;
mod string;

/* -------------------------------------------------------------------------- */
/*                                  Identity                                  */
/* -------------------------------------------------------------------------- */

/// Function that tears down an object of a concrete type.
///
/// Receives `self_ref`, the outermost segment of the object. The
/// function must release every reference the object owns and free the
/// backing allocation with [`free_object`].
pub type DestroyFn = unsafe fn(NonNull<Identity>);

/// Sentinel stored in the counter once the object has been destroyed.
const POISONED: i64 = i64::MIN;

/// Counts beyond this are treated as runaway retains.
const COUNT_LIMIT: i64 = i64::MAX / 2;

/// Per-segment object metadata.
///
/// Every class segment begins with a field of this type, and every
/// class uses `#[repr(C)]`, so a pointer to a segment can be read as a
/// pointer to its identity and back.
#[repr(C)]
pub struct Identity
{
    // INVARIANT: After construction, self_ref points at the outermost
    // segment of the allocation this segment is part of, and up_ref at
    // the segment one level closer to the outermost type. For the
    // outermost segment both point at the segment itself.
    self_ref: NonNull<Identity>,
    up_ref: NonNull<Identity>,

    /// The shared reference counter. Live only in the outermost
    /// segment; embedded segments carry the field but never use it.
    count: Cell<i64>,

    /// Aliases the outermost segment's counter.
    count_ref: NonNull<Cell<i64>>,

    /// Destructor of the concrete type. `None` in embedded segments.
    destroy: Option<DestroyFn>,
}

impl Identity
{
    /// Initialize the identity of an outermost segment.
    ///
    /// The count starts at zero and `destroy` is set here, exactly
    /// once; embedding initializers never touch it.
    ///
    /// # Safety
    ///
    /// `seg` must point at the start of a fresh allocation obtained
    /// from [`alloc_object`].
    pub unsafe fn init_outermost(seg: NonNull<Identity>, destroy: DestroyFn)
    {
        let ptr = seg.as_ptr();
        addr_of_mut!((*ptr).self_ref).write(seg);
        addr_of_mut!((*ptr).up_ref).write(seg);
        addr_of_mut!((*ptr).count).write(Cell::new(0));
        addr_of_mut!((*ptr).count_ref)
            .write(NonNull::new_unchecked(addr_of!((*ptr).count) as *mut _));
        addr_of_mut!((*ptr).destroy).write(Some(destroy));
    }

    /// Initialize the identity of an embedded segment.
    ///
    /// `up` is the segment one level closer to the outermost type;
    /// `outer` is the outermost segment. The counter reference is
    /// pointed at the outermost counter, so every segment of an object
    /// aliases the same cell.
    ///
    /// # Safety
    ///
    /// `seg` must point at an uninitialized segment inside the
    /// allocation that starts at `outer`, and `outer` must already be
    /// initialized with [`Identity::init_outermost`].
    pub unsafe fn init_embedded(
        seg: NonNull<Identity>,
        up: NonNull<Identity>,
        outer: NonNull<Identity>,
    )
    {
        let ptr = seg.as_ptr();
        addr_of_mut!((*ptr).self_ref).write(outer);
        addr_of_mut!((*ptr).up_ref).write(up);
        addr_of_mut!((*ptr).count).write(Cell::new(0));
        addr_of_mut!((*ptr).count_ref)
            .write(NonNull::new_unchecked(addr_of!((*outer.as_ptr()).count) as *mut _));
        addr_of_mut!((*ptr).destroy).write(None);
    }

    /// The outermost segment of the object this segment is part of.
    pub fn self_ref(&self) -> NonNull<Identity>
    {
        self.self_ref
    }

    /// The segment one level closer to the outermost type.
    ///
    /// For the outermost segment this equals [`self_ref`][`Self::self_ref`].
    pub fn up_ref(&self) -> NonNull<Identity>
    {
        self.up_ref
    }

    /// The current reference count of the object this segment is part of.
    pub fn count(&self) -> i64
    {
        self.count_cell().get()
    }

    fn count_cell(&self) -> &Cell<i64>
    {
        // SAFETY: count_ref aliases the counter of a live object.
        unsafe { self.count_ref.as_ref() }
    }
}

/* -------------------------------------------------------------------------- */
/*                                  Segments                                  */
/* -------------------------------------------------------------------------- */

/// Trait for typed views of class segments.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` structs whose first field is an
/// [`Identity`] (or an embedded segment, which starts with one), and
/// references must only exist to segments of live, fully constructed
/// objects.
pub unsafe trait Segment
{
    /// The identity block of this segment.
    fn identity(&self) -> &Identity;
}

/// Increment the reference count of the object `seg` is part of.
///
/// Returns the segment, so a retain can be inserted into an expression
/// the way compiled code does it.
pub fn retain<S>(seg: &S) -> &S
    where S: Segment
{
    let count = seg.identity().count_cell();
    let value = count.get();
    if value == POISONED {
        lifecycle_fatal("retain of a destroyed object");
    }
    if value >= COUNT_LIMIT {
        lifecycle_fatal("reference count overflow");
    }
    count.set(value + 1);
    seg
}

/// Decrement the reference count of the object `seg` is part of.
///
/// When the count reaches zero the counter is poisoned and the
/// destructor installed by the outermost constructor runs, freeing the
/// backing allocation. A release that observes the poison sentinel is
/// reported on stderr and aborts the process.
///
/// # Safety
///
/// The object must not be used again after the release that brings its
/// count to zero.
pub unsafe fn release<S>(seg: &S)
    where S: Segment
{
    let identity = seg.identity();
    let count = identity.count_cell();
    let value = count.get();
    if value == POISONED {
        lifecycle_fatal("release of a destroyed object");
    }
    let value = value - 1;
    count.set(value);

    if value <= 0 {
        let outer = identity.self_ref();
        count.set(POISONED);

        // Only the outermost segment carries a destructor.
        let destroy = (*outer.as_ptr()).destroy;
        match destroy {
            Some(destroy) => destroy(outer),
            None => lifecycle_fatal("destroy of a partially constructed object"),
        }
    }
}

/// Report a fatal lifecycle error and abort the process.
fn lifecycle_fatal(what: &str) -> !
{
    eprintln!("rime-runtime: fatal: {}", what);
    abort();
}

/* -------------------------------------------------------------------------- */
/*                                 Allocation                                 */
/* -------------------------------------------------------------------------- */

/// Ensure that what embeds this is at least object-aligned.
#[repr(align(8))]
pub struct ObjectAlign;

/// Minimum required alignment for objects.
pub const OBJECT_ALIGN: usize = align_of::<ObjectAlign>();

/// Allocate one block for a complete composite object.
///
/// Allocation failure is fatal, via [`handle_alloc_error`].
///
/// # Safety
///
/// The caller must initialize the block per the embedding protocol
/// before the object is used, and must size it for the full composite
/// structure including any tail payload.
pub unsafe fn alloc_object(size: usize) -> NonNull<()>
{
    let ptr = libc::malloc(size);
    let Some(ptr) = NonNull::new(ptr) else {
        let layout = Layout::from_size_align_unchecked(size, OBJECT_ALIGN);
        handle_alloc_error(layout);
    };
    ptr.cast()
}

/// Free the block backing a destroyed object.
///
/// # Safety
///
/// `outer` must be the outermost segment of an allocation obtained
/// from [`alloc_object`], and nothing may touch the object afterwards.
pub unsafe fn free_object(outer: NonNull<Identity>)
{
    libc::free(outer.as_ptr().cast());
}

/* -------------------------------------------------------------------------- */
/*                                   Errors                                   */
/* -------------------------------------------------------------------------- */

/// Returned on out-of-range access to an indexed object.
#[derive(Debug, Eq, Error, PartialEq)]
#[error("Index {index} is out of range for length {len}")]
pub struct IndexError
{
    /// The offending index.
    pub index: i64,

    /// The length of the indexed object.
    pub len: usize,
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::handle::Root,
        proptest::proptest,
        std::{cell::Cell, mem::size_of, ptr::{NonNull, addr_of_mut}},
    };

    thread_local! {
        static DESTROYED: Cell<u64> = Cell::new(0);
    }

    /// Minimal concrete class whose destructor is observable.
    #[repr(C)]
    struct Probe
    {
        identity: Identity,
        base: Obj,
    }

    unsafe impl Segment for Probe
    {
        fn identity(&self) -> &Identity
        {
            &self.identity
        }
    }

    impl Probe
    {
        fn new() -> Root<Probe>
        {
            // SAFETY: new_raw returns a fresh, fully constructed object.
            unsafe { Root::retaining(Self::new_raw()) }
        }

        unsafe fn new_raw() -> NonNull<Probe>
        {
            let ptr = alloc_object(size_of::<Probe>()).cast::<Probe>();
            let obj = ptr.as_ptr();
            Identity::init_outermost(ptr.cast(), destroy_probe);
            Obj::embed(
                NonNull::new_unchecked(addr_of_mut!((*obj).base)),
                ptr.cast(),
                ptr.cast(),
            );
            ptr
        }
    }

    unsafe fn destroy_probe(outer: NonNull<Identity>)
    {
        DESTROYED.with(|cell| cell.set(cell.get() + 1));
        free_object(outer);
    }

    fn destroyed() -> u64
    {
        DESTROYED.with(|cell| cell.get())
    }

    #[test]
    fn self_ref_equality()
    {
        let probe = Probe::new();
        let outer = NonNull::from(probe.identity());
        assert_eq!(probe.identity().self_ref(), outer);
        assert_eq!(probe.base.identity().self_ref(), outer);
    }

    #[test]
    fn up_ref_chain()
    {
        let probe = Probe::new();
        let outer = NonNull::from(probe.identity());
        assert_eq!(probe.identity().up_ref(), outer);
        assert_eq!(probe.base.identity().up_ref(), outer);
    }

    #[test]
    fn count_aliased_across_segments()
    {
        let probe = Probe::new();
        assert_eq!(probe.identity().count(), 1);
        retain(&probe.base);
        assert_eq!(probe.identity().count(), 2);
        assert_eq!(probe.base.identity().count(), 2);
        // SAFETY: The root still holds a reference.
        unsafe { release(&*probe) };
        assert_eq!(probe.base.identity().count(), 1);
    }

    proptest!
    {
        #[test]
        fn destructor_fires_once_after_nth_release(n in 1 .. 50_i64)
        {
            let before = destroyed();

            // SAFETY: Fresh object; retains and releases below balance.
            unsafe {
                let probe = Probe::new_raw();
                for _ in 0 .. n {
                    retain(probe.as_ref());
                }
                for _ in 0 .. n - 1 {
                    release(probe.as_ref());
                }
                assert_eq!(destroyed(), before);
                assert_eq!(probe.as_ref().identity().count(), 1);
                release(probe.as_ref());
            }

            assert_eq!(destroyed(), before + 1);
        }
    }
}
