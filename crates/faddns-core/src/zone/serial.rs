//! Serial Incrementer

use std::path::Path;
use tracing::{debug, error, warn};

use crate::error::Result;

const SERIAL_KEYWORD: &[u8] = b"serial";

/// Increment the first integer on the first serial line of `text`.
///
/// A serial line is any line mentioning "serial" (case-insensitive) that
/// also carries an integer. Returns `None` when no such line exists. All
/// other lines are copied unchanged.
pub fn bump_serial_text(text: &str) -> Option<String> {
    bump_serial_bytes(text.as_bytes()).map(|out| String::from_utf8_lossy(&out).into_owned())
}

/// Byte-level [`bump_serial_text`]; lines in other encodings pass through.
///
/// Serials are 32-bit sequence numbers: `4294967295` wraps around to `0`,
/// which is the next serial in sequence space arithmetic. A number that
/// does not fit in 32 bits is not a usable serial.
pub fn bump_serial_bytes(content: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(content.len() + 1);
    let mut done = false;

    for (index, line) in content.split_inclusive(|b| *b == b'\n').enumerate() {
        if !done && mentions_serial(line) {
            match increment_first_integer(line) {
                Some((bumped, from, to)) => {
                    if to < from {
                        warn!("Serial on line {} wraps around: {} -> {}", index + 1, from, to);
                    } else {
                        debug!("Serial on line {}: {} -> {}", index + 1, from, to);
                    }
                    out.extend_from_slice(&bumped);
                    done = true;
                    continue;
                }
                None => warn!("Line {} mentions a serial but has no usable number", index + 1),
            }
        }
        out.extend_from_slice(line);
    }

    done.then_some(out)
}

fn mentions_serial(line: &[u8]) -> bool {
    line.windows(SERIAL_KEYWORD.len())
        .any(|window| window.eq_ignore_ascii_case(SERIAL_KEYWORD))
}

fn increment_first_integer(line: &[u8]) -> Option<(Vec<u8>, u32, u32)> {
    let start = line.iter().position(u8::is_ascii_digit)?;
    let len = line[start..]
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(line.len() - start);
    let end = start + len;

    let serial: u32 = std::str::from_utf8(&line[start..end]).ok()?.parse().ok()?;
    let next = serial.wrapping_add(1);

    let mut bumped = Vec::with_capacity(line.len() + 1);
    bumped.extend_from_slice(&line[..start]);
    bumped.extend_from_slice(next.to_string().as_bytes());
    bumped.extend_from_slice(&line[end..]);
    Some((bumped, serial, next))
}

/// Copy `serial_in` to `output` with its serial incremented.
///
/// Returns `Ok(false)` when no serial line was found; `output` then holds
/// an unmodified copy of the input.
pub async fn bump_serial(serial_in: &Path, output: &Path) -> Result<bool> {
    tokio::fs::copy(serial_in, output).await?;
    let content = tokio::fs::read(output).await?;

    match bump_serial_bytes(&content) {
        Some(bumped) => {
            tokio::fs::write(output, bumped).await?;
            Ok(true)
        }
        None => {
            error!("Failed to update serial in {}", serial_in.display());
            Ok(false)
        }
    }
}
