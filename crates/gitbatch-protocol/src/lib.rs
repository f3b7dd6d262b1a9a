//! Client side of git's `cat-file --batch` / `--batch-check` pipe protocol.
//!
//! A request is one `<id>\n` line. A content response is
//! `<id> <type> <size>\n`, then exactly `size` payload bytes, then `\n`; a
//! check response is the header line alone. An absent object is reported as
//! `<id> missing\n`.
//!
//! Pipes are long-lived and shared, so every consumer must leave the read
//! cursor exactly on the next header. [`BatchChannel`] leases a pipe and
//! records whether it was handed back aligned; [`BoundedReader`] guarantees
//! alignment for payload reads, whether read fully, partially, or truncated.

pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod listing;
pub mod memory;
pub mod pool;
pub mod process;
pub mod reader;

pub use channel::{BatchChannel, BatchKind, BatchPipe, BatchProvider, PipeState, ReleaseFn};
pub use codec::{
    discard_full, parse_batch_header, parse_mode, read_batch_header, unquote_c_style, BatchHeader,
    RESPONSE_TRAILER_LEN,
};
pub use config::BatchConfig;
pub use error::{ProtocolError, ProtocolResult};
pub use listing::{parse_ls_tree, read_batch_tree, read_tree_record, ListingEntry};
pub use memory::MemoryBatchProvider;
pub use pool::PipePool;
pub use process::{ProcessBatchProvider, ProcessPipe};
pub use reader::BoundedReader;
