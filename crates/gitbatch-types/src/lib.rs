//! Foundation types for gitbatch.
//!
//! This crate provides the identity and classification types shared by the
//! batch protocol client and the object facades built on top of it.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Content hash of a git object (SHA-1 or SHA-256)
//! - [`ObjectFormat`] -- Which digest a repository uses, and its widths
//! - [`ObjectKind`] -- The type tag reported by the backend (`blob`, `tree`, ...)
//! - [`EntryMode`] -- Classification of a tree entry decoded from its octal mode

pub mod error;
pub mod mode;
pub mod object;

pub use error::TypeError;
pub use mode::{EntryMode, ObjectKind};
pub use object::{ObjectFormat, ObjectId};
