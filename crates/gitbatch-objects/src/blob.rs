use std::io::{self, Cursor, Read};
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderStringWriter;
use gitbatch_protocol::{discard_full, BatchKind, BoundedReader, RESPONSE_TRAILER_LEN};
use gitbatch_types::ObjectId;
use tracing::debug;

use crate::error::{ObjectError, ObjectResult};
use crate::repository::Repository;

/// A content object, read on demand through the repository's channels.
#[derive(Clone, Debug)]
pub struct Blob {
    id: ObjectId,
    name: String,
    size: OnceLock<u64>,
    repo: Repository,
}

impl Blob {
    pub(crate) fn new(repo: Repository, id: ObjectId, name: String) -> Self {
        Self {
            id,
            name,
            size: OnceLock::new(),
            repo,
        }
    }

    pub(crate) fn with_size(repo: Repository, id: ObjectId, name: String, size: Option<u64>) -> Self {
        let blob = Self::new(repo, id, name);
        if let Some(size) = size {
            let _ = blob.size.set(size);
        }
        blob
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Display name; empty for blobs looked up by id.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Object size, asked of a check channel the first time.
    pub fn try_size(&self) -> ObjectResult<u64> {
        if let Some(size) = self.size.get() {
            return Ok(*size);
        }
        let size = self.repo.object_size(&self.id)?;
        Ok(*self.size.get_or_init(|| size))
    }

    /// Like [`try_size`](Self::try_size), but a failed lookup is logged and
    /// reported as 0. Callers that only use the size as a hint want this.
    pub fn size(&self) -> u64 {
        match self.try_size() {
            Ok(size) => size,
            Err(e) => {
                debug!(id = %self.id, error = %e, "size lookup failed; reporting 0");
                0
            }
        }
    }

    /// Open the content for reading.
    ///
    /// Small blobs are read in full and their channel released before this
    /// returns; larger ones stream from the channel until the reader is closed.
    pub fn data_async(&self) -> ObjectResult<BlobReader> {
        let (mut channel, header) = self.repo.open_object(BatchKind::Content, &self.id)?;
        let _ = self.size.set(header.size);

        if header.size >= self.repo.config().small_object_threshold {
            return Ok(BlobReader::Streaming(BoundedReader::new(channel, header.size)));
        }

        let mut data = vec![0u8; header.size as usize];
        let read = channel
            .reader()
            .read_exact(&mut data)
            .and_then(|()| discard_full(channel.reader(), RESPONSE_TRAILER_LEN));
        match read {
            Ok(()) => {
                channel.release();
                Ok(BlobReader::Buffered(Cursor::new(data)))
            }
            Err(e) => {
                channel.cancel();
                Err(e.into())
            }
        }
    }

    /// Stream at most `limit` bytes. The full size is returned alongside; the
    /// bytes past `limit` are discarded when the reader closes.
    pub fn new_truncated_reader(&self, limit: u64) -> ObjectResult<(BoundedReader, u64)> {
        let (channel, header) = self.repo.open_object(BatchKind::Content, &self.id)?;
        let _ = self.size.set(header.size);
        Ok((BoundedReader::truncated(channel, header.size, limit), header.size))
    }

    /// Up to `limit` bytes of content. A zero limit returns nothing without
    /// touching the backend.
    pub fn content(&self, limit: u64) -> ObjectResult<Vec<u8>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let (mut rd, size) = self.new_truncated_reader(limit)?;
        let mut buf = Vec::with_capacity(limit.min(size) as usize);
        let read = rd.read_to_end(&mut buf);
        let closed = rd.close();
        read?;
        closed?;
        Ok(buf)
    }

    pub fn content_string(&self, limit: u64) -> ObjectResult<String> {
        let bytes = self.content(limit)?;
        Ok(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// Base64 of the whole content. Unlike [`content`](Self::content) this
    /// never truncates: a blob larger than `limit` is an error.
    pub fn content_base64(&self, limit: u64) -> ObjectResult<String> {
        let size = self.size();
        if size > limit {
            return Err(ObjectError::TooLarge { size, limit });
        }
        // The pre-check trusts a size that may have fallen back to 0.
        let (mut rd, full) = self.new_truncated_reader(limit)?;
        if full > limit {
            rd.close()?;
            return Err(ObjectError::TooLarge { size: full, limit });
        }
        let mut encoder = EncoderStringWriter::new(&STANDARD);
        let copied = io::copy(&mut rd, &mut encoder);
        let closed = rd.close();
        copied?;
        closed?;
        Ok(encoder.into_inner())
    }
}

/// Reader returned by [`Blob::data_async`].
#[derive(Debug)]
pub enum BlobReader {
    /// Content already in memory; no channel held.
    Buffered(Cursor<Vec<u8>>),
    /// Content streaming from a leased channel.
    Streaming(BoundedReader),
}

impl BlobReader {
    /// Release the channel, if one is held. Dropping the reader does the same.
    pub fn close(&mut self) -> io::Result<()> {
        match self {
            Self::Buffered(_) => Ok(()),
            Self::Streaming(rd) => rd.close(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }
}

impl Read for BlobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Buffered(c) => c.read(buf),
            Self::Streaming(rd) => rd.read(buf),
        }
    }
}
