//! `@`-escaped file name encoding used in control files.
//!
//! The publishing service cannot pass arbitrary file names through a
//! space-separated control line, so it escapes them:
//!
//! | sequence          | meaning                                        |
//! |-------------------|------------------------------------------------|
//! | `@@`              | literal `@`                                    |
//! | `@_` `@t` `@n` `@r` `@(` `@)` | space, tab, LF, CR, `<`, `>`       |
//! | `@` + 2 of `H..=W`| one byte-valued character, high nibble first   |
//! | `@` + 4 hex digits| a BMP code point                               |
//!
//! Decoding is a single bounds-checked scan; a truncated or unknown escape
//! is an error rather than being passed through.

use crate::error::ConversionError;

/// Escape introducer.
const ESCAPE: char = '@';

/// First character of the nibble window (`H`, nibble 0).
const NIBBLE_FIRST: u32 = 0x48;

/// Last character of the nibble window (`W`, nibble 15).
const NIBBLE_LAST: u32 = 0x57;

/// Two-character escapes: the character after `@` and what it stands for.
const ESCAPE_TABLE: &[(char, char)] = &[
    ('_', ' '),
    ('t', '\t'),
    ('n', '\n'),
    ('r', '\r'),
    ('(', '<'),
    (')', '>'),
];

/// Length of the `@XXXX` code point escape, introducer included.
const HEX_ESCAPE_LEN: usize = 5;

fn nibble_value(c: char) -> Option<u32> {
    let v = c as u32;
    (NIBBLE_FIRST..=NIBBLE_LAST)
        .contains(&v)
        .then(|| v - NIBBLE_FIRST)
}

fn nibble_char(value: u32) -> char {
    // value is always < 16
    char::from_u32(NIBBLE_FIRST + value).unwrap_or('H')
}

fn invalid_escape(encoded: &str, chars: &[char], offset: usize, len: usize) -> ConversionError {
    let end = (offset + len).min(chars.len());
    ConversionError::InvalidNameEscape {
        name: encoded.to_string(),
        offset,
        sequence: chars[offset..end].iter().collect(),
    }
}

/// Decode an escaped file name.
pub fn decode_name(encoded: &str) -> Result<String, ConversionError> {
    let chars: Vec<char> = encoded.chars().collect();
    let mut decoded = String::with_capacity(encoded.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != ESCAPE {
            decoded.push(c);
            i += 1;
            continue;
        }

        let Some(&next) = chars.get(i + 1) else {
            return Err(invalid_escape(encoded, &chars, i, 1));
        };

        if next == ESCAPE {
            decoded.push(ESCAPE);
            i += 2;
            continue;
        }

        if let Some(&(_, literal)) = ESCAPE_TABLE.iter().find(|(key, _)| *key == next) {
            decoded.push(literal);
            i += 2;
            continue;
        }

        let low = chars.get(i + 2).copied().and_then(nibble_value);
        if let (Some(high), Some(low)) = (nibble_value(next), low) {
            let value = high * 16 + low;
            let ch = char::from_u32(value)
                .ok_or_else(|| invalid_escape(encoded, &chars, i, 3))?;
            decoded.push(ch);
            i += 3;
            continue;
        }

        if i + HEX_ESCAPE_LEN > chars.len() {
            return Err(invalid_escape(encoded, &chars, i, HEX_ESCAPE_LEN));
        }
        let digits: String = chars[i + 1..i + HEX_ESCAPE_LEN].iter().collect();
        if !digits.chars().all(|d| d.is_ascii_hexdigit()) {
            return Err(invalid_escape(encoded, &chars, i, HEX_ESCAPE_LEN));
        }
        let ch = u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| invalid_escape(encoded, &chars, i, HEX_ESCAPE_LEN))?;
        decoded.push(ch);
        i += HEX_ESCAPE_LEN;
    }

    Ok(decoded)
}

/// Encode a file name; the exact inverse of [`decode_name`].
///
/// Fails for characters outside the Basic Multilingual Plane.
pub fn encode_name(name: &str) -> Result<String, ConversionError> {
    let mut encoded = String::with_capacity(name.len());

    for c in name.chars() {
        if c == ESCAPE {
            encoded.push(ESCAPE);
            encoded.push(ESCAPE);
        } else if let Some(&(key, _)) = ESCAPE_TABLE.iter().find(|(_, literal)| *literal == c) {
            encoded.push(ESCAPE);
            encoded.push(key);
        } else if c.is_ascii() && !c.is_ascii_control() {
            encoded.push(c);
        } else {
            let code_point = c as u32;
            if code_point <= 0xFF {
                encoded.push(ESCAPE);
                encoded.push(nibble_char(code_point >> 4));
                encoded.push(nibble_char(code_point & 0x0F));
            } else if code_point <= 0xFFFF {
                encoded.push(ESCAPE);
                encoded.push_str(&format!("{:04X}", code_point));
            } else {
                return Err(ConversionError::UnencodableCharacter { code_point });
            }
        }
    }

    Ok(encoded)
}
