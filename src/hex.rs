use core::fmt;

use crate::error::AtError;

/// Decode a hex string such as `"1A2B"` into `out`, returning the number of
/// bytes written.
pub fn decode_hex(s: &str, out: &mut [u8]) -> Result<usize, DecodeHexError> {
    if s.len() % 2 != 0 {
        return Err(DecodeHexError::OddLength);
    }

    let len = s.len() / 2;
    if len > out.len() {
        return Err(DecodeHexError::NoMemory);
    }

    for (byte, pair) in out.iter_mut().zip(s.as_bytes().chunks_exact(2)) {
        *byte = (nibble(pair[0])? << 4) | nibble(pair[1])?;
    }

    Ok(len)
}

/// Decode a hex string of at most eight digits as a number, e.g. a cell id.
pub fn parse_hex_u32(s: &str) -> Result<u32, DecodeHexError> {
    if s.is_empty() || s.len() > 8 {
        return Err(DecodeHexError::NoMemory);
    }

    s.bytes()
        .try_fold(0u32, |acc, c| -> Result<u32, DecodeHexError> {
            Ok((acc << 4) | u32::from(nibble(c)?))
        })
}

fn nibble(c: u8) -> Result<u8, DecodeHexError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(DecodeHexError::InvalidDigit(c)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeHexError {
    OddLength,
    InvalidDigit(u8),
    NoMemory,
}

impl fmt::Display for DecodeHexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeHexError::OddLength => "input string has an odd number of bytes".fmt(f),
            DecodeHexError::InvalidDigit(c) => write!(f, "invalid hex digit {:#04x}", c),
            DecodeHexError::NoMemory => "output buffer too small".fmt(f),
        }
    }
}

impl From<DecodeHexError> for AtError {
    fn from(e: DecodeHexError) -> Self {
        match e {
            DecodeHexError::NoMemory => AtError::NoMemory,
            DecodeHexError::OddLength | DecodeHexError::InvalidDigit(_) => AtError::BadParameter,
        }
    }
}
