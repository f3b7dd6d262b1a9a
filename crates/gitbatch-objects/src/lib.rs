//! Typed views over git objects, read through `cat-file` batch channels.
//!
//! - [`Repository`]: the shared context; owns the channel provider.
//! - [`Blob`]: lazily sized content, readable in full, truncated, or as base64.
//! - [`Tree`] / [`TreeEntry`]: directory listings and path lookup, with
//!   symlink resolution across directories.
//! - [`Entries`]: presentation ordering (directories first, then by name).
//!
//! Nothing here holds a channel between calls. Each operation leases one,
//! and the lease ends aligned or cancelled on every exit path.

pub mod blob;
pub mod config;
pub mod entries;
pub mod entry;
pub mod error;
pub mod repository;
pub mod tree;

pub use blob::{Blob, BlobReader};
pub use config::ObjectConfig;
pub use entries::Entries;
pub use entry::TreeEntry;
pub use error::{BadLinkReason, ObjectError, ObjectResult};
pub use repository::Repository;
pub use tree::Tree;
