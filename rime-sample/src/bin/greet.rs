//! The greeting conformance program.
//!
//! Builds a `RealPerson`, greets directly, then greets again through a
//! base-typed reference kept by a `Holder`. Both greetings must resolve
//! through the embedding chain to the same implementation.

use {
    rime_runtime::{entry::print, object::Str},
    rime_sample::{Holder, RealPerson},
    std::io,
};

fn main() -> io::Result<()>
{
    let bob = RealPerson::new();
    bob.as_person().set_name(&Str::new(b"Bob"));
    bob.as_person().set_age(7);

    let jane = Str::new(b"Jane");
    print(bob.as_person().greet(&jane).as_obj())?;

    let holder = Holder::new();
    holder.set_person(Some(bob.as_person()));
    if let Some(person) = holder.person() {
        print(person.greet(&jane).as_obj())?;
    }

    Ok(())
}
