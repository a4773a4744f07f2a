//! String helpers used by every response and URC parser.
//!
//! All helpers reject empty input and input longer than
//! [`AT_MAX_STRING_SIZE`] with [`AtError::BadParameter`]. Helpers that only
//! shrink a line return a sub-slice of it; helpers that have to drop
//! characters from the middle copy into a bounded [`heapless::String`] and
//! fail with [`AtError::NoMemory`] when it is too small.

use heapless::String;

use crate::config::AT_MAX_STRING_SIZE;
use crate::error::AtError;

/// Default token delimiter of AT responses.
pub const DELIMITER: char = ',';

fn validate(s: &str) -> Result<(), AtError> {
    if s.is_empty() || s.len() > AT_MAX_STRING_SIZE {
        return Err(AtError::BadParameter);
    }
    Ok(())
}

fn is_prefix_leading_char(c: char) -> bool {
    c == '+' || c.is_ascii_alphabetic()
}

fn is_prefix_char(c: char) -> bool {
    c == '+' || c == '_' || c.is_ascii_alphanumeric()
}

/// Whether `s` starts with an AT prefix such as `+CSQ:` or `QIURC:`.
///
/// A prefix is a leading `+` or letter followed by letters, digits, `+` or
/// `_`, up to the first `:`.
pub fn is_prefix_present(s: &str) -> Result<bool, AtError> {
    validate(s)?;

    let Some(colon) = s.find(':') else {
        return Ok(false);
    };

    let mut chars = s[..colon].chars();
    match chars.next() {
        Some(c) if is_prefix_leading_char(c) => Ok(chars.all(is_prefix_char)),
        _ => Ok(false),
    }
}

pub fn str_starts_with(s: &str, prefix: &str) -> Result<bool, AtError> {
    validate(s)?;
    validate(prefix)?;
    Ok(s.starts_with(prefix))
}

/// Drop everything up to and including the first `:`.
pub fn remove_prefix(s: &str) -> Result<&str, AtError> {
    validate(s)?;
    s.find(':')
        .map(|i| &s[i + 1..])
        .ok_or(AtError::BadParameter)
}

pub fn remove_leading_whitespace(s: &str) -> Result<&str, AtError> {
    validate(s)?;
    Ok(s.trim_start_matches(|c: char| c.is_ascii_whitespace()))
}

pub fn remove_trailing_whitespace(s: &str) -> Result<&str, AtError> {
    validate(s)?;
    Ok(s.trim_end_matches(|c: char| c.is_ascii_whitespace()))
}

pub fn remove_all_whitespace<const N: usize>(s: &str) -> Result<String<N>, AtError> {
    validate(s)?;
    collect_without(s, |c| c.is_ascii_whitespace())
}

/// Strip one leading and one trailing `"` if present.
///
/// Strings of two characters or less are returned unchanged, so `""` stays
/// an empty quoted string rather than collapsing.
pub fn remove_outermost_double_quote(s: &str) -> Result<&str, AtError> {
    validate(s)?;

    if s.len() <= 2 {
        return Ok(s);
    }

    let s = s.strip_prefix('"').unwrap_or(s);
    Ok(s.strip_suffix('"').unwrap_or(s))
}

pub fn remove_all_double_quote<const N: usize>(s: &str) -> Result<String<N>, AtError> {
    validate(s)?;
    collect_without(s, |c| c == '"')
}

fn collect_without<const N: usize>(
    s: &str,
    drop: impl Fn(char) -> bool,
) -> Result<String<N>, AtError> {
    let mut out = String::new();
    for c in s.chars().filter(|&c| !drop(c)) {
        out.push(c).map_err(|_| AtError::NoMemory)?;
    }
    Ok(out)
}

/// Take the next `,` delimited token off `s`.
///
/// See [`get_specific_next_tok`].
pub fn get_next_tok<'a>(s: &mut &'a str) -> Result<&'a str, AtError> {
    get_specific_next_tok(s, &[DELIMITER])
}

/// Take the next token delimited by any of `delimiters` off `s`, advancing
/// `s` past the delimiter.
///
/// A delimiter in first position yields an empty token, so `",5"` gives
/// `""` then `"5"`. Calling this on an exhausted string is an error, which
/// is how parsers detect a missing trailing field.
pub fn get_specific_next_tok<'a>(
    s: &mut &'a str,
    delimiters: &[char],
) -> Result<&'a str, AtError> {
    if delimiters.is_empty() {
        return Err(AtError::BadParameter);
    }
    validate(s)?;

    let input: &'a str = *s;
    match input.find(|c: char| delimiters.contains(&c)) {
        Some(i) => {
            *s = &input[i + 1..];
            Ok(&input[..i])
        }
        None => {
            *s = &input[input.len()..];
            Ok(input)
        }
    }
}

pub fn is_str_digit(s: &str) -> Result<bool, AtError> {
    validate(s)?;
    Ok(s.bytes().all(|b| b.is_ascii_digit()))
}

/// Whether `s` starts with any of the tokens in `keys`.
pub fn check_error_code(s: &str, keys: &[&str]) -> Result<bool, AtError> {
    validate(s)?;
    Ok(keys
        .iter()
        .any(|key| matches!(str_starts_with(s, key), Ok(true))))
}

/// Copy `s` into an owned bounded string.
pub fn str_dup<const N: usize>(s: &str) -> Result<String<N>, AtError> {
    validate(s)?;
    String::try_from(s).map_err(|_| AtError::NoMemory)
}

/// Parse a leading integer in `radix`, ignoring leading whitespace and
/// anything after the digits.
///
/// Fails with [`AtError::Error`] if no digit was consumed or the value
/// does not fit an `i32`.
pub fn strtoi(s: &str, radix: u32) -> Result<i32, AtError> {
    if !(2..=36).contains(&radix) {
        return Err(AtError::BadParameter);
    }

    let s = s.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let end = digits
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(digits.len());
    if end == 0 {
        return Err(AtError::Error);
    }

    let magnitude = i64::from_str_radix(&digits[..end], radix).map_err(|_| AtError::Error)?;
    let value = if negative { -magnitude } else { magnitude };
    i32::try_from(value).map_err(|_| AtError::Error)
}

/// [`strtoi`] narrowed to a target integer type.
pub fn strtoi_as<T: TryFrom<i32>>(s: &str, radix: u32) -> Result<T, AtError> {
    T::try_from(strtoi(s, radix)?).map_err(|_| AtError::Error)
}
