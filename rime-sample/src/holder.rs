use {
    crate::person::Person,
    rime_runtime::{
        handle::Root,
        object::{
            Identity, Obj, Segment,
            alloc_object, free_object, release, retain,
        },
    },
    std::{
        cell::Cell,
        mem::size_of,
        ptr::{NonNull, addr_of_mut},
    },
};

/// A class that keeps a base-typed reference to a person.
///
/// Exercises the field ownership discipline: the field retains what it
/// stores and releases it on replacement and on destruction.
#[repr(C)]
pub struct Holder
{
    identity: Identity,
    base: Obj,
    person: Cell<Option<NonNull<Person>>>,
}

unsafe impl Segment for Holder
{
    fn identity(&self) -> &Identity
    {
        &self.identity
    }
}

impl Holder
{
    /// Create a holder with an empty person field.
    pub fn new() -> Root<Holder>
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
    pub unsafe fn new_raw() -> NonNull<Holder>
    {
        let ptr = alloc_object(size_of::<Holder>()).cast::<Holder>();
        let obj = ptr.as_ptr();

        Identity::init_outermost(ptr.cast(), destroy_holder);
        Obj::embed(
            NonNull::new_unchecked(addr_of_mut!((*obj).base)),
            ptr.cast(),
            ptr.cast(),
        );
        addr_of_mut!((*obj).person).write(Cell::new(None));

        ptr
    }

    /// The capability segment of this holder.
    pub fn as_obj(&self) -> &Obj
    {
        &self.base
    }

    /// The held person, if any.
    pub fn person(&self) -> Option<Root<Person>>
    {
        // SAFETY: The field owns a reference, so the occupant is live.
        self.person.get().map(|person| unsafe { Root::retaining(person) })
    }

    /// Replace the held person, balancing the field's reference.
    pub fn set_person(&self, person: Option<&Person>)
    {
        let next = person.map(|person| NonNull::from(retain(person)));
        let prev = self.person.replace(next);
        if let Some(prev) = prev {
            // SAFETY: The field owned a reference to the previous
            // occupant.
            unsafe { release(prev.as_ref()) };
        }
    }
}

unsafe fn destroy_holder(outer: NonNull<Identity>)
{
    let this = outer.cast::<Holder>();
    if let Some(person) = this.as_ref().person.get() {
        release(person.as_ref());
    }
    free_object(outer);
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::person::{Person, RealPerson},
        rime_runtime::object::{Segment, Str},
    };

    #[test]
    fn field_balances_counts()
    {
        let ada = Person::new();
        {
            let holder = Holder::new();
            holder.set_person(Some(&*ada));
            assert_eq!(ada.identity().count(), 2);

            holder.set_person(None);
            assert_eq!(ada.identity().count(), 1);

            holder.set_person(Some(&*ada));
            assert_eq!(ada.identity().count(), 2);
        }
        assert_eq!(ada.identity().count(), 1);
    }

    #[test]
    fn greeting_through_a_held_base_reference()
    {
        let bob = RealPerson::new();
        bob.as_person().set_name(&Str::new(b"Bob"));

        let holder = Holder::new();
        holder.set_person(Some(bob.as_person()));

        let held = holder.person().expect("holder keeps the person");
        let greeting = held.greet(&Str::new(b"Jane"));
        assert_eq!(greeting.as_bytes(), b"Hi, Jane, I'm Bob\n");
    }
}
