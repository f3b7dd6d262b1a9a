//! Tree listing parsers.
//!
//! Two sources produce tree entries:
//!
//! - `ls-tree` text output, already captured in a buffer:
//!   `<mode> <type> <id>[ <padded-size>]\t<name>\n`, with `<name>` C-quoted
//!   when it contains unusual bytes.
//! - A tree object streamed out of a `--batch` pipe, in git's binary tree
//!   encoding: `<mode> <name>\0<raw id>` repeated, followed by the response
//!   trailer.

use std::io::{self, BufRead};

use gitbatch_types::{EntryMode, ObjectFormat, ObjectId};

use crate::codec::{discard_full, parse_mode, unquote_c_style, RESPONSE_TRAILER_LEN};
use crate::error::{ProtocolError, ProtocolResult};

/// One parsed tree entry, not yet attached to a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingEntry {
    pub mode: EntryMode,
    pub id: ObjectId,
    pub name: String,
    /// Present only when the listing carried a size column.
    pub size: Option<u64>,
}

fn cut(data: &[u8], sep: u8) -> (&[u8], &[u8]) {
    match data.iter().position(|b| *b == sep) {
        Some(i) => (&data[..i], &data[i + 1..]),
        None => (data, &data[data.len()..]),
    }
}

/// Parse the captured output of `git ls-tree` (with or without `-l`).
pub fn parse_ls_tree(data: &[u8]) -> ProtocolResult<Vec<ListingEntry>> {
    let newlines = data.iter().filter(|b| **b == b'\n').count();
    let mut entries = Vec::with_capacity(newlines + 1);

    let mut pos = 0;
    while pos < data.len() {
        let end = data[pos..]
            .iter()
            .position(|b| *b == b'\n')
            .map_or(data.len(), |i| pos + i);
        let line = &data[pos..end];
        pos = end + 1;
        entries.push(parse_ls_tree_line(line)?);
    }
    Ok(entries)
}

fn parse_ls_tree_line(line: &[u8]) -> ProtocolResult<ListingEntry> {
    let tab = line
        .iter()
        .position(|b| *b == b'\t')
        .ok_or_else(|| ProtocolError::malformed("invalid ls-tree output (no tab)", line))?;
    let (attrs, raw_name) = (&line[..tab], &line[tab + 1..]);

    let (mode, attrs) = cut(attrs, b' ');
    // The type column is implied by the mode.
    let (_kind, attrs) = cut(attrs, b' ');
    let (id, size) = cut(attrs, b' ');

    let size = if size.is_empty() {
        None
    } else {
        // Trees carry "-" in the size column.
        std::str::from_utf8(size)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
    };

    let mode = parse_mode(mode)?;
    let id = ObjectId::from_hex_bytes(id).map_err(|e| {
        ProtocolError::malformed(format!("invalid ls-tree output (invalid object id: {e})"), line)
    })?;

    let name = if raw_name.first() == Some(&b'"') {
        let unquoted = unquote_c_style(raw_name).map_err(|reason| {
            ProtocolError::malformed(format!("invalid ls-tree output (invalid name: {reason})"), line)
        })?;
        String::from_utf8_lossy(&unquoted).into_owned()
    } else {
        String::from_utf8_lossy(raw_name).into_owned()
    };

    Ok(ListingEntry {
        mode,
        id,
        name,
        size,
    })
}

/// Read one binary tree record from `rd`.
///
/// Returns the entry and the number of bytes it occupied, or `None` when the
/// stream ends before a complete record.
pub fn read_tree_record<R: BufRead + ?Sized>(
    format: ObjectFormat,
    rd: &mut R,
    scratch: &mut Vec<u8>,
) -> ProtocolResult<Option<(ListingEntry, u64)>> {
    scratch.clear();
    let read = rd.read_until(b'\0', scratch)?;
    if read == 0 || scratch.last() != Some(&b'\0') {
        return Ok(None);
    }
    let record = &scratch[..read - 1];
    let space = record
        .iter()
        .position(|b| *b == b' ')
        .ok_or_else(|| ProtocolError::malformed("tree record without mode", record))?;
    let mode = parse_mode(&record[..space])?;
    let name = String::from_utf8_lossy(&record[space + 1..]).into_owned();

    let mut raw = vec![0u8; format.raw_len()];
    match rd.read_exact(&mut raw) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let id = ObjectId::from_raw(format, &raw)?;

    let consumed = (read + raw.len()) as u64;
    Ok(Some((
        ListingEntry {
            mode,
            id,
            name,
            size: None,
        },
        consumed,
    )))
}

/// Parse a tree object of `size` bytes from a `--batch` pipe positioned just
/// after its header, then consume the response trailer.
pub fn read_batch_tree<R: BufRead + ?Sized>(
    format: ObjectFormat,
    rd: &mut R,
    size: u64,
) -> ProtocolResult<Vec<ListingEntry>> {
    let mut scratch = Vec::with_capacity(256);
    let mut entries = Vec::with_capacity(10);

    // Records never read past the payload, however malformed.
    let mut payload = io::Read::take(&mut *rd, size);
    while payload.limit() > 0 {
        let Some((entry, _)) = read_tree_record(format, &mut payload, &mut scratch)? else {
            break;
        };
        entries.push(entry);
    }
    discard_full(rd, RESPONSE_TRAILER_LEN)?;
    Ok(entries)
}
