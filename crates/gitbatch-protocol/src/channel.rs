use std::fmt;
use std::io::{self, BufRead, Write};

use gitbatch_types::ObjectId;
use tracing::trace;

use crate::codec::{read_batch_header, BatchHeader};
use crate::error::ProtocolResult;

/// The two flavors of batch process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BatchKind {
    /// `cat-file --batch-check`: header lines only.
    Check,
    /// `cat-file --batch`: header, payload, trailing newline.
    Content,
}

impl BatchKind {
    /// The `cat-file` flag that selects this flavor.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Check => "--batch-check",
            Self::Content => "--batch",
        }
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Check => write!(f, "check"),
            Self::Content => write!(f, "content"),
        }
    }
}

/// Write side and persistent buffered read side of one long-lived batch
/// process.
///
/// The buffered reader must live as long as the pipe: bytes it has already
/// pulled from the process belong to later responses.
pub trait BatchPipe: Send {
    fn writer(&mut self) -> &mut dyn Write;
    fn reader(&mut self) -> &mut dyn BufRead;
}

/// Whether a pipe's read cursor sits at the start of the next response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipeState {
    Aligned,
    Desynced,
}

/// Called exactly once when a channel lease ends.
pub type ReleaseFn = Box<dyn FnOnce(Box<dyn BatchPipe>, PipeState) + Send>;

/// Exclusive lease on a batch pipe.
///
/// A lease is the only handle through which the pipe can be read, and it must
/// end with [`release`](Self::release) (cursor aligned) or
/// [`cancel`](Self::cancel) (cursor position unknown). Dropping a lease
/// without either counts as a cancel.
pub struct BatchChannel {
    kind: BatchKind,
    pipe: Option<Box<dyn BatchPipe>>,
    on_release: Option<ReleaseFn>,
}

impl BatchChannel {
    pub fn new(kind: BatchKind, pipe: Box<dyn BatchPipe>, on_release: ReleaseFn) -> Self {
        Self {
            kind,
            pipe: Some(pipe),
            on_release: Some(on_release),
        }
    }

    /// A lease with no pool behind it: the pipe is dropped when the lease ends.
    pub fn detached(kind: BatchKind, pipe: Box<dyn BatchPipe>) -> Self {
        Self::new(kind, pipe, Box::new(|_, _| {}))
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    fn pipe(&mut self) -> &mut (dyn BatchPipe + 'static) {
        &mut **self
            .pipe
            .get_or_insert_with(|| Box::new(ReleasedPipe) as Box<dyn BatchPipe>)
    }

    /// Send one request line, `<id>\n`.
    pub fn request(&mut self, id: &ObjectId) -> io::Result<()> {
        trace!(kind = %self.kind, id = %id, "batch request");
        let writer = self.pipe().writer();
        writer.write_all(format!("{id}\n").as_bytes())?;
        writer.flush()
    }

    /// Read the response header for the last request.
    pub fn read_header(&mut self) -> ProtocolResult<BatchHeader> {
        read_batch_header(self.reader())
    }

    /// The shared buffered read side of the pipe.
    pub fn reader(&mut self) -> &mut dyn BufRead {
        self.pipe().reader()
    }

    /// End the lease with the pipe aligned on the next response header.
    pub fn release(self) {
        self.finish(PipeState::Aligned);
    }

    /// End the lease without any claim about the pipe's position.
    pub fn cancel(self) {
        self.finish(PipeState::Desynced);
    }

    fn finish(mut self, state: PipeState) {
        self.settle(state);
    }

    fn settle(&mut self, state: PipeState) {
        if let (Some(pipe), Some(on_release)) = (self.pipe.take(), self.on_release.take()) {
            trace!(kind = %self.kind, ?state, "batch channel released");
            on_release(pipe, state);
        }
    }
}

impl Drop for BatchChannel {
    fn drop(&mut self) {
        self.settle(PipeState::Desynced);
    }
}

impl fmt::Debug for BatchChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchChannel")
            .field("kind", &self.kind)
            .field("open", &self.pipe.is_some())
            .finish()
    }
}

/// Stands in for the pipe once a lease has ended; every I/O call fails.
struct ReleasedPipe;

fn released() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "batch channel already released")
}

impl BatchPipe for ReleasedPipe {
    fn writer(&mut self) -> &mut dyn Write {
        self
    }

    fn reader(&mut self) -> &mut dyn BufRead {
        self
    }
}

impl Write for ReleasedPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(released())
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(released())
    }
}

impl io::Read for ReleasedPipe {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(released())
    }
}

impl BufRead for ReleasedPipe {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Err(released())
    }

    fn consume(&mut self, _amt: usize) {}
}

/// Source of batch channels.
///
/// Implementations own process supervision and pooling; callers acquire a
/// lease per operation and end it on every exit path.
pub trait BatchProvider: Send + Sync {
    fn acquire(&self, kind: BatchKind) -> ProtocolResult<BatchChannel>;
}
