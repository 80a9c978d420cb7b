use std::io::{self, Read};

use encoding_rs::{CoderResult, Encoding};
use memchr::memchr2;

use crate::dialect::Dialect;
use crate::encoding::strip_bom;

const SNIFF_CHUNK_SIZE: usize = 4096;

/// Decode the first physical line of a file, without its terminator.
/// Returns `None` for an empty file.
pub(crate) fn read_first_line<R: Read>(
    mut reader: R,
    encoding: &'static Encoding,
) -> io::Result<Option<String>> {
    let mut decoder = encoding.new_decoder_with_bom_removal();
    let mut buf = [0u8; SNIFF_CHUNK_SIZE];
    let mut line = String::new();
    let mut read_any = false;

    loop {
        let n = loop {
            match reader.read(&mut buf) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        };

        let last = n == 0;
        read_any |= !last;

        let before = line.len();
        let mut src = &buf[..n];

        loop {
            line.reserve(
                decoder
                    .max_utf8_buffer_length(src.len())
                    .unwrap_or(src.len() * 3 + 16),
            );

            let (result, read, _) = decoder.decode_to_string(src, &mut line, last);
            src = &src[read..];

            if let CoderResult::InputEmpty = result {
                break;
            }
        }

        if let Some(offset) = memchr2(b'\r', b'\n', &line.as_bytes()[before..]) {
            line.truncate(before + offset);
            return Ok(Some(line));
        }

        if last {
            return Ok(read_any.then_some(line));
        }
    }
}

/// Split a decoded header line into its tokens, removing enclosures.
///
/// Doubled enclosures stand for a literal one. The escape sequence, when
/// distinct from the enclosure, makes the next enclosure, delimiter or
/// escape literal.
pub(crate) fn split_header(
    line: &str,
    delimiter: &str,
    enclosure: Option<&str>,
    escape: Option<&str>,
) -> Vec<String> {
    let enclosure = enclosure.filter(|e| !e.is_empty());
    let escape = escape.filter(|e| !e.is_empty() && Some(*e) != enclosure);

    let mut tokens = Vec::new();
    let mut rest = line;

    loop {
        let mut token = String::new();
        let mut i = 0;
        let mut inside = false;
        let mut next = None;

        if let Some(enclosure) = enclosure {
            if rest.starts_with(enclosure) {
                inside = true;
                i = enclosure.len();
            }
        }

        while i < rest.len() {
            let tail = &rest[i..];

            if let Some(escape) = escape {
                if let Some(after) = tail.strip_prefix(escape) {
                    let literal = [enclosure, Some(delimiter), Some(escape)]
                        .into_iter()
                        .flatten()
                        .find(|pattern| after.starts_with(pattern));

                    if let Some(literal) = literal {
                        token.push_str(literal);
                        i += escape.len() + literal.len();
                        continue;
                    }
                }
            }

            if inside {
                // `inside` implies an enclosure
                let enclosure = enclosure.unwrap_or_default();

                if let Some(after) = tail.strip_prefix(enclosure) {
                    if after.starts_with(enclosure) {
                        token.push_str(enclosure);
                        i += 2 * enclosure.len();
                    } else {
                        inside = false;
                        i += enclosure.len();
                    }

                    continue;
                }
            } else if tail.starts_with(delimiter) {
                next = Some(&tail[delimiter.len()..]);
                break;
            }

            let c = tail.chars().next().unwrap_or_default();
            token.push(c);
            i += c.len_utf8();
        }

        tokens.push(token);

        match next {
            Some(remaining) => rest = remaining,
            None => break,
        }
    }

    tokens
}

/// Sniff the header names of a file, as found on its first line.
pub(crate) fn read_header_names<R: Read>(reader: R, dialect: &Dialect) -> io::Result<Vec<String>> {
    let line = match read_first_line(reader, dialect.encoding())? {
        Some(line) => line,
        None => return Ok(Vec::new()),
    };

    Ok(split_header(
        &line,
        dialect.delimiter_text(),
        dialect.enclosure_text(),
        dialect.escape_text(),
    )
    .into_iter()
    .map(|token| strip_bom(token.trim()).trim().to_string())
    .collect())
}
