//! Byte stuffing
//!
//! Every FLAG or ESCAPE byte in the stuffed region is replaced by
//! `ESCAPE, byte ^ ESCAPE_OFFSET`, so FLAG only ever appears on the wire as
//! a delimiter.
use crate::contracts::{ESCAPE, ESCAPE_OFFSET, FLAG};
use crate::errors::FramingError;

/// True if `byte` must be escaped on the wire
#[inline]
pub fn needs_escape(byte: u8) -> bool {
    byte == FLAG || byte == ESCAPE
}

/// Number of bytes `data` occupies once stuffed
pub fn stuffed_len(data: &[u8]) -> usize {
    data.len() + data.iter().filter(|&&b| needs_escape(b)).count()
}

/// Append the stuffed form of `data` to `out`
pub fn stuff_into(data: &[u8], out: &mut Vec<u8>) {
    out.reserve(stuffed_len(data));
    for &byte in data {
        if needs_escape(byte) {
            out.push(ESCAPE);
            out.push(byte ^ ESCAPE_OFFSET);
        } else {
            out.push(byte);
        }
    }
}

/// Escape FLAG and ESCAPE bytes in `data`
pub fn stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(stuffed_len(data));
    stuff_into(data, &mut out);
    out
}

/// Reverse [`stuff`]
///
/// # Errors
/// Returns [`FramingError::DanglingEscape`] when the input ends with an
/// ESCAPE byte that has no byte after it.
pub fn destuff(stuffed: &[u8]) -> Result<Vec<u8>, FramingError> {
    let mut out = Vec::with_capacity(stuffed.len());
    let mut bytes = stuffed.iter();
    while let Some(&byte) = bytes.next() {
        if byte == ESCAPE {
            let &escaped = bytes.next().ok_or(FramingError::DanglingEscape)?;
            out.push(escaped ^ ESCAPE_OFFSET);
        } else {
            out.push(byte);
        }
    }
    Ok(out)
}
