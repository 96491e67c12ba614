//! Fixed-point values with exactly one fractional digit, stored as tenths.

use std::fmt;

use crate::error::MalformedKind;

/// Where and why a value failed to parse. `index` is relative to the slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberError {
    pub index: usize,
    pub kind: MalformedKind,
}

impl NumberError {
    fn at(index: usize, kind: MalformedKind) -> Self {
        Self { index, kind }
    }
}

#[inline(always)]
fn digit(bytes: &[u8], i: usize, missing: MalformedKind) -> Result<i64, NumberError> {
    match bytes.get(i) {
        Some(b @ b'0'..=b'9') => Ok((b - b'0') as i64),
        Some(&b) => Err(NumberError::at(i, MalformedKind::UnexpectedByte(b))),
        None => Err(NumberError::at(i, missing)),
    }
}

/// Parses `-?[0-9]+\.[0-9]` from the start of `bytes` and returns the value in
/// tenths together with the number of bytes it occupied.
#[inline]
pub fn parse_tenths_prefix(bytes: &[u8]) -> Result<(i64, usize), NumberError> {
    if bytes.is_empty() {
        return Err(NumberError::at(0, MalformedKind::EmptyValue));
    }

    let negative = bytes[0] == b'-';
    let mut i = negative as usize;

    let mut value = digit(bytes, i, MalformedKind::MissingIntegerDigits)?;
    i += 1;

    loop {
        match bytes.get(i) {
            Some(b @ b'0'..=b'9') => {
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add((b - b'0') as i64))
                    .ok_or(NumberError::at(i, MalformedKind::Overflow))?;
                i += 1;
            }
            Some(b'.') => {
                i += 1;
                break;
            }
            Some(&b) => return Err(NumberError::at(i, MalformedKind::UnexpectedByte(b))),
            None => return Err(NumberError::at(i, MalformedKind::MissingDecimalPoint)),
        }
    }

    let fraction = match bytes.get(i) {
        Some(b @ b'0'..=b'9') => (b - b'0') as i64,
        Some(&b) => return Err(NumberError::at(i, MalformedKind::UnexpectedByte(b))),
        None => return Err(NumberError::at(i, MalformedKind::MissingFractionDigit)),
    };
    value = value
        .checked_mul(10)
        .and_then(|v| v.checked_add(fraction))
        .ok_or(NumberError::at(i, MalformedKind::Overflow))?;
    i += 1;

    Ok((if negative { -value } else { value }, i))
}

/// Parses a whole slice as one value in tenths. Anything after the fractional
/// digit is an error.
#[inline]
pub fn parse_tenths(bytes: &[u8]) -> Result<i64, NumberError> {
    let (value, used) = parse_tenths_prefix(bytes)?;
    if used != bytes.len() {
        return Err(NumberError::at(used, MalformedKind::TrailingBytes));
    }
    Ok(value)
}

/// Displays a tenths value with one fractional digit, e.g. `-5` as `-0.5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenths(pub i64);

impl fmt::Display for Tenths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{}", sign, abs / 10, abs % 10)
    }
}
