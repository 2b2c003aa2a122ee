//! String literal decoding.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum UnquoteError {
    #[error("not a string literal")]
    NotQuoted,
    #[error("invalid escape sequence at byte {0}")]
    BadEscape(usize),
    #[error("literal is not valid UTF-8")]
    InvalidUtf8,
}

/// Decodes a Go string literal (quotes included) into its value.
///
/// Raw literals drop carriage returns; interpreted literals process the
/// full escape set, `\x` and octal escapes as raw bytes.
pub fn unquote(lit: &str) -> Result<String, UnquoteError> {
    let bytes = lit.as_bytes();
    if bytes.len() < 2 {
        return Err(UnquoteError::NotQuoted);
    }
    let (open, close) = (bytes[0], bytes[bytes.len() - 1]);
    let body = &lit[1..lit.len() - 1];

    match (open, close) {
        (b'`', b'`') => Ok(body.replace('\r', "")),
        (b'"', b'"') => {
            if !body.contains('\\') {
                return Ok(body.to_owned());
            }
            unescape(body)
        }
        _ => Err(UnquoteError::NotQuoted),
    }
}

fn unescape(body: &str) -> Result<String, UnquoteError> {
    let src = body.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(src.len());
    let mut i = 0;

    while i < src.len() {
        if src[i] != b'\\' {
            out.push(src[i]);
            i += 1;
            continue;
        }
        let at = i + 1; // offset inside the literal, counting the quote
        let esc = *src.get(i + 1).ok_or(UnquoteError::BadEscape(at))?;
        i += 2;
        match esc {
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'\\' => out.push(b'\\'),
            b'"' => out.push(b'"'),
            b'x' => {
                out.push(hex_value(src, i, 2).ok_or(UnquoteError::BadEscape(at))? as u8);
                i += 2;
            }
            b'0'..=b'7' => {
                let digits = src.get(i - 1..i + 2).ok_or(UnquoteError::BadEscape(at))?;
                let mut v: u32 = 0;
                for &d in digits {
                    if !(b'0'..=b'7').contains(&d) {
                        return Err(UnquoteError::BadEscape(at));
                    }
                    v = v * 8 + u32::from(d - b'0');
                }
                if v > 255 {
                    return Err(UnquoteError::BadEscape(at));
                }
                out.push(v as u8);
                i += 2;
            }
            b'u' | b'U' => {
                let n = if esc == b'u' { 4 } else { 8 };
                let cp = hex_value(src, i, n).ok_or(UnquoteError::BadEscape(at))?;
                let ch = char::from_u32(cp).ok_or(UnquoteError::BadEscape(at))?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                i += n;
            }
            _ => return Err(UnquoteError::BadEscape(at)),
        }
    }

    String::from_utf8(out).map_err(|_| UnquoteError::InvalidUtf8)
}

fn hex_value(src: &[u8], start: usize, n: usize) -> Option<u32> {
    let digits = src.get(start..start + n)?;
    let mut v: u32 = 0;
    for &d in digits {
        let nibble = match d {
            b'0'..=b'9' => d - b'0',
            b'a'..=b'f' => d - b'a' + 10,
            b'A'..=b'F' => d - b'A' + 10,
            _ => return None,
        };
        v = v.checked_mul(16)? + u32::from(nibble);
    }
    Some(v)
}
