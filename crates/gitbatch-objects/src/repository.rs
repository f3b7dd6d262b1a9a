use std::fmt;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use gitbatch_protocol::{
    read_batch_tree, BatchChannel, BatchConfig, BatchHeader, BatchKind, BatchProvider,
    BoundedReader, ListingEntry, ProcessBatchProvider, ProtocolError,
};
use gitbatch_types::{ObjectFormat, ObjectId, ObjectKind};
use tracing::trace;

use crate::blob::Blob;
use crate::config::ObjectConfig;
use crate::error::{ObjectError, ObjectResult};
use crate::tree::Tree;

/// Shared context for object lookups in one repository.
///
/// Cheap to clone. Blobs and trees keep a clone so they can open channels
/// on demand; no channel is held between operations.
#[derive(Clone)]
pub struct Repository {
    inner: Arc<RepoInner>,
}

struct RepoInner {
    provider: Arc<dyn BatchProvider>,
    format: ObjectFormat,
    config: ObjectConfig,
}

impl Repository {
    pub fn new(provider: Arc<dyn BatchProvider>, format: ObjectFormat) -> Self {
        Self::with_config(provider, format, ObjectConfig::default())
    }

    pub fn with_config(
        provider: Arc<dyn BatchProvider>,
        format: ObjectFormat,
        config: ObjectConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RepoInner {
                provider,
                format,
                config,
            }),
        }
    }

    /// Talk to `git cat-file` processes running in `path`.
    pub fn open(path: impl Into<PathBuf>, format: ObjectFormat, batch: BatchConfig) -> Self {
        Self::new(Arc::new(ProcessBatchProvider::new(path, batch)), format)
    }

    pub fn format(&self) -> ObjectFormat {
        self.inner.format
    }

    pub fn config(&self) -> &ObjectConfig {
        &self.inner.config
    }

    pub fn provider(&self) -> &Arc<dyn BatchProvider> {
        &self.inner.provider
    }

    /// Blob view for a hex id. Existence is not checked until the blob is read.
    pub fn get_blob(&self, hex: &str) -> ObjectResult<Blob> {
        let id = ObjectId::from_hex(hex)?;
        if id.is_zero() {
            return Err(ObjectError::NotExist {
                id: id.to_hex(),
                path: String::new(),
            });
        }
        Ok(self.blob(id))
    }

    pub fn blob(&self, id: ObjectId) -> Blob {
        Blob::new(self.clone(), id, String::new())
    }

    /// Load the tree `id` refers to, peeling annotated tags and commits.
    pub fn get_tree(&self, id: ObjectId) -> ObjectResult<Tree> {
        let (id, entries) = self.read_tree(id)?;
        Ok(Tree::new(self.clone(), id, None, entries))
    }

    pub(crate) fn read_tree(&self, mut id: ObjectId) -> ObjectResult<(ObjectId, Vec<ListingEntry>)> {
        loop {
            let (mut channel, header) = self.open_object(BatchKind::Content, &id)?;
            let field = match header.kind {
                ObjectKind::Tree => {
                    return match read_batch_tree(self.format(), channel.reader(), header.size) {
                        Ok(entries) => {
                            channel.release();
                            Ok((id, entries))
                        }
                        Err(e) => {
                            channel.cancel();
                            Err(e.into())
                        }
                    };
                }
                ObjectKind::Commit => "tree ",
                ObjectKind::Tag => "object ",
                ObjectKind::Blob => {
                    BoundedReader::new(channel, header.size).close()?;
                    return Err(ObjectError::UnexpectedKind {
                        id: id.to_hex(),
                        expected: ObjectKind::Tree,
                        actual: header.kind,
                    });
                }
            };

            let mut rd = BoundedReader::new(channel, header.size);
            let next = header_field(&mut rd, &id, field);
            rd.close()?;
            let next = next?;
            trace!(from = %id, to = %next, kind = %header.kind, "peeled to tree");
            id = next;
        }
    }

    /// Size of `id` as reported by a check channel.
    pub fn object_size(&self, id: &ObjectId) -> ObjectResult<u64> {
        let (channel, header) = self.open_object(BatchKind::Check, id)?;
        channel.release();
        Ok(header.size)
    }

    /// Request `id` and read its response header.
    ///
    /// A `missing` answer leaves the pipe aligned, so the lease is released;
    /// any other failure cancels it.
    pub(crate) fn open_object(
        &self,
        kind: BatchKind,
        id: &ObjectId,
    ) -> ObjectResult<(BatchChannel, BatchHeader)> {
        let mut channel = self.inner.provider.acquire(kind)?;
        if let Err(e) = channel.request(id) {
            channel.cancel();
            return Err(e.into());
        }
        match channel.read_header() {
            Ok(header) => Ok((channel, header)),
            Err(e @ ProtocolError::NotExist { .. }) => {
                channel.release();
                Err(e.into())
            }
            Err(e) => {
                channel.cancel();
                Err(e.into())
            }
        }
    }
}

/// Find the object id in the first header line starting with `prefix`.
/// Commit and tag headers end at the first empty line.
fn header_field<R: BufRead>(rd: &mut R, id: &ObjectId, prefix: &str) -> ObjectResult<ObjectId> {
    let mut line = Vec::new();
    let mut last = Vec::new();
    loop {
        line.clear();
        if rd.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        let text = line.strip_suffix(b"\n").unwrap_or(&line[..]);
        if text.is_empty() {
            break;
        }
        if let Some(hex) = text.strip_prefix(prefix.as_bytes()) {
            return Ok(ObjectId::from_hex_bytes(hex)?);
        }
        std::mem::swap(&mut line, &mut last);
    }
    Err(ProtocolError::malformed(
        format!("no `{}` header in {id}", prefix.trim_end()),
        &last,
    )
    .into())
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("format", &self.inner.format)
            .field("config", &self.inner.config)
            .finish()
    }
}
