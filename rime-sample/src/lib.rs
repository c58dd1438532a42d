//! Compiler output for the greeting conformance program, checked in as
//! a consumer of the runtime's construction and dispatch protocol.
//!
//! The Rime source declares a `Person` class with a `greet` method, a
//! `RealPerson` subclass that overrides `stringify` and inherits
//! `greet`, and a `Holder` class that keeps a base-typed reference to a
//! person. What the compiler emits for those declarations is the code
//! in this crate: one `#[repr(C)]` struct per class, an embedding
//! initializer per class, and a redirect thunk per inherited slot.

#![warn(missing_docs)]

pub use self::{holder::*, person::*};

mod holder;
mod person;
