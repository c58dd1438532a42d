use {
    rime_runtime::{
        handle::Root,
        object::{
            Identity, Obj, Segment, Str,
            alloc_object, free_object, release, retain, stringify_obj,
        },
    },
    std::{
        cell::Cell,
        mem::size_of,
        ptr::{NonNull, addr_of_mut},
    },
};

/// Function installed in the `greet` dispatch slot.
///
/// Receives the segment of the class that installed it and the party
/// to greet; returns the greeting as a retained string.
pub type GreetFn = unsafe fn(NonNull<Identity>, &Str) -> NonNull<Str>;

/* -------------------------------------------------------------------------- */
/*                                   Person                                   */
/* -------------------------------------------------------------------------- */

/// A person with a name and an age.
///
/// Defines the `greet` capability and redirects `stringify` to the
/// base implementation.
#[repr(C)]
pub struct Person
{
    identity: Identity,
    base: Obj,
    name: Cell<Option<NonNull<Str>>>,
    age: Cell<i64>,
    greet: GreetFn,
}

unsafe impl Segment for Person
{
    fn identity(&self) -> &Identity
    {
        &self.identity
    }
}

impl Person
{
    /// Create a person with default fields.
    pub fn new() -> Root<Person>
    {
        // SAFETY: new_raw returns a fresh, fully constructed object.
        unsafe { Root::retaining(Self::new_raw()) }
    }

    /// Raw constructor: fully initialized, count zero.
    ///
    /// # Safety
    ///
    /// The returned object must be retained before anything can
    /// release it.
    pub unsafe fn new_raw() -> NonNull<Person>
    {
        let ptr = alloc_object(size_of::<Person>()).cast::<Person>();
        let obj = ptr.as_ptr();

        Identity::init_outermost(ptr.cast(), destroy_person);
        Obj::embed(
            NonNull::new_unchecked(addr_of_mut!((*obj).base)),
            ptr.cast(),
            ptr.cast(),
        );
        init_person_body(obj);

        ptr
    }

    /// Embedding initializer for subclasses of `Person`.
    ///
    /// Wires the segment chain through this level and installs this
    /// level's fields and slots; the subclass overwrites the slots it
    /// specializes afterwards.
    ///
    /// # Safety
    ///
    /// `seg` must point at the uninitialized person segment of the
    /// allocation that starts at `outer`, and `outer` must already be
    /// initialized with [`Identity::init_outermost`].
    pub unsafe fn embed(
        seg: NonNull<Person>,
        up: NonNull<Identity>,
        outer: NonNull<Identity>,
    )
    {
        Identity::init_embedded(seg.cast(), up, outer);
        let obj = seg.as_ptr();
        Obj::embed(
            NonNull::new_unchecked(addr_of_mut!((*obj).base)),
            seg.cast(),
            outer,
        );
        init_person_body(obj);
    }

    /// The capability segment of this person.
    pub fn as_obj(&self) -> &Obj
    {
        &self.base
    }

    /// The person's name, if one has been set.
    pub fn name(&self) -> Option<Root<Str>>
    {
        // SAFETY: The field owns a reference, so the occupant is live.
        self.name.get().map(|name| unsafe { Root::retaining(name) })
    }

    /// Replace the person's name, balancing the field's reference.
    pub fn set_name(&self, name: &Str)
    {
        let next = NonNull::from(retain(name));
        let prev = self.name.replace(Some(next));
        if let Some(prev) = prev {
            // SAFETY: The field owned a reference to the previous name.
            unsafe { release(prev.as_ref()) };
        }
    }

    /// The person's age.
    pub fn age(&self) -> i64
    {
        self.age.get()
    }

    /// Set the person's age.
    pub fn set_age(&self, age: i64)
    {
        self.age.set(age);
    }

    /// Resolve and invoke the `greet` capability.
    ///
    /// The slot is invoked through `self_ref`, so the most-derived
    /// override executes even on a base-typed view of a subclass
    /// instance.
    pub fn greet(&self, to: &Str) -> Root<Str>
    {
        let slot = self.greet;

        // SAFETY: Live object; slot functions return a retained string.
        unsafe { Root::adopt(slot(self.identity.self_ref(), to)) }
    }
}

/// Install `Person`'s fields and slots on a person segment.
unsafe fn init_person_body(obj: *mut Person)
{
    addr_of_mut!((*obj).name).write(Cell::new(None));
    addr_of_mut!((*obj).age).write(Cell::new(0));
    addr_of_mut!((*obj).greet).write(person_greet as GreetFn);
    Obj::install_stringify(
        NonNull::new_unchecked(addr_of_mut!((*obj).base)),
        person_stringify,
    );
}

/// Release the references owned by a person segment's fields.
unsafe fn release_person_fields(obj: *mut Person)
{
    if let Some(name) = (*obj).name.get() {
        release(name.as_ref());
    }
}

/// `greet` as defined by `Person`.
unsafe fn person_greet(seg: NonNull<Identity>, to: &Str) -> NonNull<Str>
{
    let person = seg.cast::<Person>();
    let person = person.as_ref();

    let mut text = Vec::new();
    text.extend_from_slice(b"Hi, ");
    text.extend_from_slice(to.as_bytes());
    text.extend_from_slice(b", I'm ");
    if let Some(name) = person.name.get() {
        text.extend_from_slice(name.as_ref().as_bytes());
    }
    text.extend_from_slice(b"\n");

    Root::into_raw(Str::new(&text))
}

/// Redirect thunk: `Person` does not override `stringify`, so its slot
/// re-invokes the base implementation against the capability segment.
unsafe fn person_stringify(seg: NonNull<Identity>) -> NonNull<Str>
{
    let person = seg.cast::<Person>().as_ptr();
    stringify_obj(NonNull::new_unchecked(addr_of_mut!((*person).base)).cast())
}

unsafe fn destroy_person(outer: NonNull<Identity>)
{
    release_person_fields(outer.cast::<Person>().as_ptr());
    free_object(outer);
}

/* -------------------------------------------------------------------------- */
/*                                 RealPerson                                 */
/* -------------------------------------------------------------------------- */

/// A subclass of `Person` that overrides `stringify` with the person's
/// name and inherits `greet` through a redirect thunk.
#[repr(C)]
pub struct RealPerson
{
    identity: Identity,
    person: Person,
}

unsafe impl Segment for RealPerson
{
    fn identity(&self) -> &Identity
    {
        &self.identity
    }
}

impl RealPerson
{
    /// Create a real person with default fields.
    pub fn new() -> Root<RealPerson>
    {
        // SAFETY: new_raw returns a fresh, fully constructed object.
        unsafe { Root::retaining(Self::new_raw()) }
    }

    /// Raw constructor: fully initialized, count zero.
    ///
    /// # Safety
    ///
    /// The returned object must be retained before anything can
    /// release it.
    pub unsafe fn new_raw() -> NonNull<RealPerson>
    {
        let ptr = alloc_object(size_of::<RealPerson>()).cast::<RealPerson>();
        let obj = ptr.as_ptr();

        Identity::init_outermost(ptr.cast(), destroy_real_person);
        Person::embed(
            NonNull::new_unchecked(addr_of_mut!((*obj).person)),
            ptr.cast(),
            ptr.cast(),
        );

        // This type's overrides and redirects win over the embedded
        // levels' installs.
        addr_of_mut!((*obj).person.greet).write(real_person_greet as GreetFn);
        Obj::install_stringify(
            NonNull::new_unchecked(addr_of_mut!((*obj).person.base)),
            real_person_stringify,
        );

        ptr
    }

    /// The base-typed view of this instance.
    pub fn as_person(&self) -> &Person
    {
        &self.person
    }

    /// The capability segment of this instance.
    pub fn as_obj(&self) -> &Obj
    {
        &self.person.base
    }
}

/// Redirect thunk: `RealPerson` does not override `greet`, so its slot
/// re-invokes `Person`'s implementation against the person segment.
unsafe fn real_person_greet(seg: NonNull<Identity>, to: &Str) -> NonNull<Str>
{
    let this = seg.cast::<RealPerson>().as_ptr();
    person_greet(
        NonNull::new_unchecked(addr_of_mut!((*this).person)).cast(),
        to,
    )
}

/// `stringify` as overridden by `RealPerson`: the person's name.
unsafe fn real_person_stringify(seg: NonNull<Identity>) -> NonNull<Str>
{
    let this = seg.cast::<RealPerson>();
    match this.as_ref().person.name.get() {
        Some(name) => {
            retain(name.as_ref());
            name
        }
        None => Root::into_raw(Str::new(b"")),
    }
}

unsafe fn destroy_real_person(outer: NonNull<Identity>)
{
    let this = outer.cast::<RealPerson>().as_ptr();
    release_person_fields(addr_of_mut!((*this).person));
    free_object(outer);
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        rime_runtime::object::{Segment, Str},
        std::ptr::NonNull,
    };

    #[test]
    fn greeting_resolves_through_base_handle()
    {
        let bob = RealPerson::new();
        bob.as_person().set_name(&Str::new(b"Bob"));
        bob.as_person().set_age(7);

        // The handle is base-typed; the installed slot is the
        // subclass's redirect, which must reach Person's greet.
        let person: &Person = bob.as_person();
        let greeting = person.greet(&Str::new(b"Jane"));

        let text = greeting.as_bytes();
        assert_eq!(text, b"Hi, Jane, I'm Bob\n");
        assert!(
            text.windows(3).any(|window| window == b"Bob"),
            "greeting must name the person",
        );
    }

    #[test]
    fn leaf_override_executes_through_base_handle()
    {
        let bob = RealPerson::new();
        bob.as_person().set_name(&Str::new(b"Bob"));

        // stringify is defined on the capability class, overridden two
        // levels down; dispatch through the capability segment must
        // reach the leaf implementation.
        let text = bob.as_obj().stringify();
        assert_eq!(text.as_bytes(), b"Bob");
    }

    #[test]
    fn person_redirects_stringify_to_base()
    {
        let person = Person::new();
        person.set_name(&Str::new(b"Ada"));

        let outer = person.identity().self_ref();
        let expected = format!("0x{:x}", outer.as_ptr() as usize);
        assert_eq!(person.as_obj().stringify().as_bytes(), expected.as_bytes());
    }

    #[test]
    fn self_ref_spans_three_levels()
    {
        let real = RealPerson::new();
        let outer = NonNull::from(real.identity());

        assert_eq!(real.identity().self_ref(), outer);
        assert_eq!(real.person.identity().self_ref(), outer);
        assert_eq!(real.person.base.identity().self_ref(), outer);
    }

    #[test]
    fn up_ref_steps_toward_the_outermost_type()
    {
        let real = RealPerson::new();
        let outer = NonNull::from(real.identity());
        let person_seg = NonNull::from(real.person.identity());

        assert_eq!(real.identity().up_ref(), outer);
        assert_eq!(real.person.identity().up_ref(), outer);
        assert_eq!(real.person.base.identity().up_ref(), person_seg);
    }

    #[test]
    fn name_field_balances_counts()
    {
        let person = Person::new();
        let first = Str::new(b"first");
        let second = Str::new(b"second");

        person.set_name(&first);
        assert_eq!(first.identity().count(), 2);

        person.set_name(&second);
        assert_eq!(first.identity().count(), 1);
        assert_eq!(second.identity().count(), 2);

        drop(person);
        assert_eq!(second.identity().count(), 1);
    }

    #[test]
    fn greeting_without_a_name()
    {
        let person = Person::new();
        let greeting = person.greet(&Str::new(b"Jane"));
        assert_eq!(greeting.as_bytes(), b"Hi, Jane, I'm \n");
    }
}
