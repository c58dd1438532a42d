//! Runtime support library for compiled Rime programs.
//!
//! The Rime compiler targets a C-like memory model with no native notion
//! of objects or virtual dispatch. This crate supplies what compiled
//! programs link against: the object layout convention, the embedding
//! protocol that wires up single inheritance, override resolution through
//! dispatch slots, the reference-counting lifecycle, and the built-in
//! string, integer, and array classes.
//!
//! # Layout convention
//!
//! Every class is a `#[repr(C)]` struct that begins with an [`Identity`]
//! block, followed by the embedded segment of its base class, followed by
//! its own fields and dispatch slots. A complete object is one allocation
//! holding one segment per class in its inheritance chain; see the
//! [`object`] module for the protocol constructors must follow.
//!
//! [`Identity`]: `object::Identity`

#![warn(missing_docs)]

pub mod entry;
pub mod handle;
pub mod object;
