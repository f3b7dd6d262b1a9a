use std::io::{self, BufRead, Read};

use tracing::warn;

use crate::channel::BatchChannel;
use crate::codec::{discard_full, RESPONSE_TRAILER_LEN};

/// Byte stream over one `--batch` payload.
///
/// Reads stop after the payload budget. On [`close`](Self::close), or on drop,
/// every byte the response still owes is discarded (unread payload, any
/// bytes cut off by a truncated read, and the trailing newline) so the pipe
/// sits exactly on the next response header before the lease ends.
#[derive(Debug)]
pub struct BoundedReader {
    channel: Option<BatchChannel>,
    remaining: u64,
    extra_discard: u64,
}

impl BoundedReader {
    /// Bound a channel whose header announced `size` payload bytes.
    pub fn new(channel: BatchChannel, size: u64) -> Self {
        Self {
            channel: Some(channel),
            remaining: size,
            extra_discard: 0,
        }
    }

    /// Expose only the first `limit` bytes of a `full_size` payload. The rest
    /// is still discarded on close.
    pub fn truncated(channel: BatchChannel, full_size: u64, limit: u64) -> Self {
        let limit = limit.min(full_size);
        Self {
            channel: Some(channel),
            remaining: limit,
            extra_discard: full_size - limit,
        }
    }

    /// Payload bytes still readable.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_none()
    }

    /// Realign the pipe and end the channel lease.
    ///
    /// Safe to call more than once; only the first call touches the pipe. If
    /// the discard fails the error is returned, the reader still counts as
    /// closed, and the lease ends as desynchronised.
    pub fn close(&mut self) -> io::Result<()> {
        let Some(mut channel) = self.channel.take() else {
            return Ok(());
        };
        let owed = self.remaining + self.extra_discard + RESPONSE_TRAILER_LEN;
        self.remaining = 0;
        self.extra_discard = 0;

        match discard_full(channel.reader(), owed) {
            Ok(()) => {
                channel.release();
                Ok(())
            }
            Err(e) => {
                channel.cancel();
                Err(e)
            }
        }
    }
}

impl Read for BoundedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let Some(channel) = self.channel.as_mut() else {
            return Ok(0);
        };
        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = channel.reader().read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("batch pipe ended with {} payload bytes unread", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

impl BufRead for BoundedReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.remaining == 0 {
            return Ok(&[]);
        }
        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        match self.channel.as_mut() {
            Some(channel) => {
                let available = channel.reader().fill_buf()?;
                if available.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "batch pipe ended inside a payload",
                    ));
                }
                Ok(&available[..available.len().min(remaining)])
            }
            None => Ok(&[]),
        }
    }

    fn consume(&mut self, amt: usize) {
        let amt = (amt as u64).min(self.remaining);
        if let Some(channel) = self.channel.as_mut() {
            channel.reader().consume(amt as usize);
            self.remaining -= amt;
        }
    }
}

impl Drop for BoundedReader {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to realign batch pipe while dropping reader");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;

    use super::*;
    use crate::channel::testing::{BrokenPipe, ScriptedPipe};
    use crate::channel::{BatchKind, BatchPipe, PipeState};
    use crate::codec::read_batch_header;

    type Released = Arc<Mutex<Vec<(Box<dyn BatchPipe>, PipeState)>>>;

    /// Channel over canned output whose pipe is handed back on release, so the
    /// test can keep reading the same stream afterwards.
    fn channel(output: Vec<u8>) -> (BatchChannel, Released) {
        let released: Released = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&released);
        let channel = BatchChannel::new(
            BatchKind::Content,
            Box::new(ScriptedPipe::new(output)),
            Box::new(move |pipe, state| sink.lock().unwrap().push((pipe, state))),
        );
        (channel, released)
    }

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let id = "ab".repeat(20);
        let mut out = Vec::new();
        for p in payloads {
            out.extend_from_slice(format!("{id} blob {}\n", p.len()).as_bytes());
            out.extend_from_slice(p);
            out.push(b'\n');
        }
        out
    }

    /// Take back the released pipe and read the next header from it.
    fn next_header_size(released: &Released) -> (u64, PipeState) {
        let (mut pipe, state) = released.lock().unwrap().pop().unwrap();
        let header = read_batch_header(pipe.reader()).unwrap();
        (header.size, state)
    }

    fn open(output: Vec<u8>) -> (BatchChannel, u64, Released) {
        let (mut ch, released) = channel(output);
        let size = ch.read_header().unwrap().size;
        (ch, size, released)
    }

    #[test]
    fn reads_exactly_the_payload() {
        let (ch, size, released) = open(wire(&[b"file2\n", b"xy"]));
        let mut rd = BoundedReader::new(ch, size);
        let mut out = Vec::new();
        rd.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"file2\n");
        assert_eq!(rd.read(&mut [0u8; 8]).unwrap(), 0);
        rd.close().unwrap();
        assert_eq!(next_header_size(&released), (2, PipeState::Aligned));
    }

    #[test]
    fn close_discards_unread_payload() {
        let (ch, size, released) = open(wire(&[b"0123456789", b"next"]));
        let mut rd = BoundedReader::new(ch, size);
        let mut two = [0u8; 2];
        rd.read_exact(&mut two).unwrap();
        assert_eq!(&two, b"01");
        assert_eq!(rd.remaining(), 8);
        rd.close().unwrap();
        assert_eq!(next_header_size(&released), (4, PipeState::Aligned));
    }

    #[test]
    fn truncated_reader_stops_at_limit() {
        let (ch, size, released) = open(wire(&[b"file2\n", b"z"]));
        let mut rd = BoundedReader::truncated(ch, size, 4);
        let mut out = Vec::new();
        rd.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"file");
        rd.close().unwrap();
        assert_eq!(next_header_size(&released), (1, PipeState::Aligned));
    }

    #[test]
    fn truncated_limit_above_size_never_pads() {
        let (ch, size, _released) = open(wire(&[b"file2\n"]));
        let mut rd = BoundedReader::truncated(ch, size, 100);
        let mut buf = [0u8; 100];
        assert_eq!(rd.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"file2\n");
        assert_eq!(rd.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let (ch, size, released) = open(wire(&[b"abc", b"de"]));
        let mut rd = BoundedReader::new(ch, size);
        rd.close().unwrap();
        rd.close().unwrap();
        assert!(rd.is_closed());
        assert_eq!(released.lock().unwrap().len(), 1);
        assert_eq!(next_header_size(&released), (2, PipeState::Aligned));
    }

    #[test]
    fn drop_realigns_the_pipe() {
        let (ch, size, released) = open(wire(&[b"abcdef", b"g"]));
        {
            let mut rd = BoundedReader::new(ch, size);
            let mut one = [0u8; 1];
            rd.read_exact(&mut one).unwrap();
        }
        assert_eq!(next_header_size(&released), (1, PipeState::Aligned));
    }

    #[test]
    fn buf_read_respects_the_budget() {
        let (ch, size, released) = open(wire(&[b"tree abc\nparent x\n", b"q"]));
        let mut rd = BoundedReader::new(ch, size);
        let mut line = String::new();
        rd.read_line(&mut line).unwrap();
        assert_eq!(line, "tree abc\n");
        let mut rest = String::new();
        rd.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "parent x\n");
        rd.close().unwrap();
        assert_eq!(next_header_size(&released), (1, PipeState::Aligned));
    }

    #[test]
    fn short_pipe_is_an_error_not_eof() {
        let output = format!("{} blob 10\nabc", "ab".repeat(20)).into_bytes();
        let (ch, size, released) = open(output);
        let mut rd = BoundedReader::new(ch, size);
        let mut out = Vec::new();
        let err = rd.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"abc");

        let err = rd.close().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        rd.close().unwrap();
        let (_, state) = released.lock().unwrap().pop().unwrap();
        assert_eq!(state, PipeState::Desynced);
    }

    #[test]
    fn underlying_errors_propagate_and_close_still_finishes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let channel = BatchChannel::new(
            BatchKind::Content,
            Box::new(BrokenPipe),
            Box::new(move |_, state| sink.lock().unwrap().push(state)),
        );
        let mut rd = BoundedReader::new(channel, 5);
        let err = rd.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(rd.remaining(), 5);

        assert!(rd.close().is_err());
        assert!(rd.close().is_ok());
        assert_eq!(*log.lock().unwrap(), vec![PipeState::Desynced]);
    }

    proptest! {
        #[test]
        fn pipe_stays_aligned_for_any_read_pattern(
            first in proptest::collection::vec(any::<u8>(), 0..300),
            second in proptest::collection::vec(any::<u8>(), 0..40),
            limit in 0u64..400,
            read_upto in 0usize..400,
            chunk in 1usize..64,
        ) {
            let (ch, size, released) = open(wire(&[&first, &second]));
            prop_assert_eq!(size, first.len() as u64);

            let mut rd = BoundedReader::truncated(ch, size, limit);
            let visible = (limit as usize).min(first.len());
            let mut got = Vec::new();
            let mut buf = vec![0u8; chunk];
            while got.len() < read_upto {
                let n = rd.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                got.extend_from_slice(&buf[..n]);
            }
            prop_assert!(got.len() <= visible);
            prop_assert_eq!(&got[..], &first[..got.len()]);
            rd.close().unwrap();

            let (next, state) = next_header_size(&released);
            prop_assert_eq!(next, second.len() as u64);
            prop_assert_eq!(state, PipeState::Aligned);
        }
    }
}
