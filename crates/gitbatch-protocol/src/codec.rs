use std::io::{self, BufRead};

use gitbatch_types::{EntryMode, ObjectId, ObjectKind};

use crate::error::{ProtocolError, ProtocolResult};

/// Bytes the backend writes after every `--batch` payload (one `\n`).
pub const RESPONSE_TRAILER_LEN: u64 = 1;

/// Parsed `<id> <type> <size>` response header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchHeader {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub size: u64,
}

/// Read one response header from a batch pipe.
///
/// Consumes the header line including its newline and nothing more. A single
/// stray empty line in front of the header is skipped.
pub fn read_batch_header<R: BufRead + ?Sized>(rd: &mut R) -> ProtocolResult<BatchHeader> {
    let mut line = Vec::with_capacity(96);
    read_line(rd, &mut line)?;
    if line == b"\n" {
        line.clear();
        read_line(rd, &mut line)?;
    }
    parse_batch_header(&line)
}

fn read_line<R: BufRead + ?Sized>(rd: &mut R, line: &mut Vec<u8>) -> ProtocolResult<()> {
    if rd.read_until(b'\n', line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "batch pipe closed before a response header",
        )
        .into());
    }
    Ok(())
}

/// Parse a newline-terminated header line.
pub fn parse_batch_header(line: &[u8]) -> ProtocolResult<BatchHeader> {
    let body = line
        .strip_suffix(b"\n")
        .ok_or_else(|| ProtocolError::malformed("unterminated header", line))?;

    let fields: Vec<&[u8]> = body.split(|b| *b == b' ').collect();
    match fields.as_slice() {
        [id, status] if *status == b"missing" || *status == b"ambiguous" => {
            Err(ProtocolError::NotExist {
                id: String::from_utf8_lossy(id).into_owned(),
            })
        }
        [id, kind, size] => {
            let id = ObjectId::from_hex_bytes(id)
                .map_err(|e| ProtocolError::malformed(format!("invalid object id: {e}"), line))?;
            let kind = std::str::from_utf8(kind)
                .ok()
                .and_then(|k| k.parse::<ObjectKind>().ok())
                .ok_or_else(|| ProtocolError::malformed("unknown object type", line))?;
            let size = std::str::from_utf8(size)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| ProtocolError::malformed("invalid size", line))?;
            Ok(BatchHeader { id, kind, size })
        }
        _ => Err(ProtocolError::malformed(
            "expected <id> <type> <size>",
            line,
        )),
    }
}

/// Decode an octal tree-entry mode field.
pub fn parse_mode(field: &[u8]) -> ProtocolResult<EntryMode> {
    let text = String::from_utf8_lossy(field);
    let bits = u32::from_str_radix(&text, 8)
        .map_err(|_| ProtocolError::InvalidMode(text.clone().into_owned()))?;
    EntryMode::from_mode_bits(bits).ok_or(ProtocolError::UnknownMode(bits))
}

/// Undo git's C-style path quoting.
///
/// `quoted` must include the surrounding double quotes. Octal escapes denote
/// raw bytes, so the result is bytes rather than text.
pub fn unquote_c_style(quoted: &[u8]) -> Result<Vec<u8>, &'static str> {
    let inner = quoted
        .strip_prefix(b"\"")
        .and_then(|q| q.strip_suffix(b"\""))
        .ok_or("missing quotes")?;

    let mut out = Vec::with_capacity(inner.len());
    let mut bytes = inner.iter().copied();
    while let Some(b) = bytes.next() {
        match b {
            b'"' => return Err("unescaped quote"),
            b'\\' => {
                let escaped = match bytes.next().ok_or("dangling backslash")? {
                    b'a' => 0x07,
                    b'b' => 0x08,
                    b't' => b'\t',
                    b'n' => b'\n',
                    b'v' => 0x0b,
                    b'f' => 0x0c,
                    b'r' => b'\r',
                    b'"' => b'"',
                    b'\\' => b'\\',
                    d @ b'0'..=b'3' => {
                        let mut value = u32::from(d - b'0');
                        for _ in 0..2 {
                            match bytes.next() {
                                Some(o @ b'0'..=b'7') => value = value * 8 + u32::from(o - b'0'),
                                _ => return Err("short octal escape"),
                            }
                        }
                        value as u8
                    }
                    _ => return Err("unknown escape"),
                };
                out.push(escaped);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Discard exactly `n` bytes from `rd`.
///
/// Fails with `UnexpectedEof` if the stream ends first.
pub fn discard_full<R: BufRead + ?Sized>(rd: &mut R, mut n: u64) -> io::Result<()> {
    while n > 0 {
        let available = rd.fill_buf()?;
        if available.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("batch pipe ended with {n} bytes left to discard"),
            ));
        }
        let step = available.len().min(usize::try_from(n).unwrap_or(usize::MAX));
        rd.consume(step);
        n -= step as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use gitbatch_types::ObjectFormat;
    use proptest::prelude::*;

    use super::*;

    // `git hash-object` of "file2\n".
    const BLOB: &str = "6c493ff740f9380390d5c9ddef4af18697ac9375";

    #[test]
    fn header_parses_sha1() {
        let h = parse_batch_header(format!("{BLOB} blob 6\n").as_bytes()).unwrap();
        assert_eq!(h.id.to_hex(), BLOB);
        assert_eq!(h.kind, ObjectKind::Blob);
        assert_eq!(h.size, 6);
    }

    #[test]
    fn header_parses_sha256() {
        let id = "ab".repeat(32);
        let h = parse_batch_header(format!("{id} tree 1234\n").as_bytes()).unwrap();
        assert_eq!(h.id.format(), ObjectFormat::Sha256);
        assert_eq!(h.size, 1234);
    }

    #[test]
    fn missing_maps_to_not_exist() {
        let err = parse_batch_header(format!("{BLOB} missing\n").as_bytes()).unwrap_err();
        match err {
            ProtocolError::NotExist { id } => assert_eq!(id, BLOB),
            other => panic!("unexpected {other:?}"),
        }
        let err = parse_batch_header(b"deadbeef ambiguous\n").unwrap_err();
        assert!(err.is_not_exist());
    }

    #[test]
    fn malformed_headers_keep_the_line() {
        for line in [
            format!("{BLOB} blob\n"),
            format!("{BLOB} blob six\n"),
            format!("{BLOB} blob -1\n"),
            format!("{BLOB} widget 6\n"),
            "nothex blob 6\n".to_string(),
            format!("{BLOB} blob 6"),
            format!("{BLOB} blob 6 extra\n"),
        ] {
            match parse_batch_header(line.as_bytes()) {
                Err(ProtocolError::Malformed { line: raw, .. }) => assert_eq!(raw, line),
                other => panic!("{line:?} gave {other:?}"),
            }
        }
    }

    #[test]
    fn read_header_consumes_exactly_one_line() {
        let mut rd = Cursor::new(format!("{BLOB} blob 3\nabc\n").into_bytes());
        let h = read_batch_header(&mut rd).unwrap();
        assert_eq!(h.size, 3);
        assert_eq!(rd.position() as usize, BLOB.len() + " blob 3\n".len());
    }

    #[test]
    fn read_header_skips_one_stray_newline() {
        let mut rd = Cursor::new(format!("\n{BLOB} commit 10\n").into_bytes());
        assert_eq!(read_batch_header(&mut rd).unwrap().kind, ObjectKind::Commit);
    }

    #[test]
    fn read_header_on_closed_pipe_is_io_error() {
        let mut rd = Cursor::new(Vec::new());
        let err = read_batch_header(&mut rd).unwrap_err();
        assert!(matches!(err, ProtocolError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn mode_table() {
        assert_eq!(parse_mode(b"040000").unwrap(), EntryMode::Tree);
        assert_eq!(parse_mode(b"120000").unwrap(), EntryMode::Symlink);
        assert_eq!(parse_mode(b"160000").unwrap(), EntryMode::Commit);
        assert_eq!(parse_mode(b"100644").unwrap(), EntryMode::Blob);
        assert_eq!(parse_mode(b"100755").unwrap(), EntryMode::Exec);
        assert_eq!(parse_mode(b"40000").unwrap(), EntryMode::Tree);
    }

    #[test]
    fn mode_errors() {
        assert!(matches!(parse_mode(b"100999"), Err(ProtocolError::InvalidMode(_))));
        assert!(matches!(parse_mode(b""), Err(ProtocolError::InvalidMode(_))));
        match parse_mode(b"777") {
            Err(err @ ProtocolError::UnknownMode(0o777)) => {
                assert_eq!(err.to_string(), "unknown mode: 777")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unquote_escapes() {
        assert_eq!(unquote_c_style(br#""a\tb""#).unwrap(), b"a\tb");
        assert_eq!(unquote_c_style(br#""say \"hi\"""#).unwrap(), b"say \"hi\"");
        assert_eq!(unquote_c_style(br#""back\\slash""#).unwrap(), b"back\\slash");
        assert_eq!(
            unquote_c_style(br#""caf\303\251""#).unwrap(),
            "café".as_bytes()
        );
    }

    #[test]
    fn unquote_rejects_bad_input() {
        assert!(unquote_c_style(b"\"open").is_err());
        assert!(unquote_c_style(br#""bad\q""#).is_err());
        assert!(unquote_c_style(br#""short\30""#).is_err());
        assert!(unquote_c_style(br#""trailing\""#).is_err());
        assert!(unquote_c_style(br#""in"side""#).is_err());
    }

    #[test]
    fn discard_full_stops_at_count() {
        let mut rd = Cursor::new(b"0123456789".to_vec());
        discard_full(&mut rd, 4).unwrap();
        assert_eq!(rd.position(), 4);
        discard_full(&mut rd, 0).unwrap();
        assert_eq!(rd.position(), 4);
    }

    #[test]
    fn discard_full_past_end_fails() {
        let mut rd = Cursor::new(b"abc".to_vec());
        let err = discard_full(&mut rd, 5).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    /// Quote bytes the way `git ls-tree` does for unusual names.
    fn quote_c_style(raw: &[u8]) -> Vec<u8> {
        let mut out = vec![b'"'];
        for &b in raw {
            match b {
                b'\t' => out.extend_from_slice(b"\\t"),
                b'\n' => out.extend_from_slice(b"\\n"),
                b'"' => out.extend_from_slice(b"\\\""),
                b'\\' => out.extend_from_slice(b"\\\\"),
                0x20..=0x7e => out.push(b),
                _ => out.extend_from_slice(format!("\\{b:03o}").as_bytes()),
            }
        }
        out.push(b'"');
        out
    }

    proptest! {
        #[test]
        fn quoted_names_decode_to_raw_bytes(raw in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(unquote_c_style(&quote_c_style(&raw)).unwrap(), raw);
        }

        #[test]
        fn mode_decoding_is_total(bits in 0u32..0o1000000) {
            let text = format!("{bits:o}");
            match parse_mode(text.as_bytes()) {
                Ok(mode) => prop_assert_eq!(EntryMode::from_mode_bits(bits), Some(mode)),
                Err(ProtocolError::UnknownMode(b)) => {
                    prop_assert_eq!(b, bits);
                    prop_assert!(EntryMode::from_mode_bits(bits).is_none());
                }
                Err(other) => prop_assert!(false, "unexpected error {}", other),
            }
        }
    }
}
