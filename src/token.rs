//! Base-38 packed identifiers.
//!
//! A token stores up to 12 characters from `[0-9a-z_]` in a `u64`. Uppercase
//! letters fold to lowercase; any other byte encodes as 0 and terminates the
//! decoded string.

use std::fmt;

/// Alphabet size of the encoding
pub const TOKEN_RADIX: u64 = 38;

/// Longest string that fits in a token
pub const MAX_TOKEN_LENGTH: usize = 12;

const LETTERS: &[u8; 38] = b"\x000123456789abcdefghijklmnopqrstuvwxyz_";

const fn letter_id(c: u8) -> u64 {
    match c {
        b'0'..=b'9' => (c - b'0') as u64 + 1,
        b'a'..=b'z' => (c - b'a') as u64 + 11,
        b'A'..=b'Z' => (c - b'A') as u64 + 11,
        b'_' => 37,
        _ => 0,
    }
}

/// Packed identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u64);

impl Token {
    /// Encode a string. Characters past the twelfth are ignored.
    pub const fn from_str_const(s: &str) -> Self {
        let bytes = s.as_bytes();
        let mut value = 0u64;
        let mut multiplier = 1u64;
        let mut i = 0;
        while i < bytes.len() && i < MAX_TOKEN_LENGTH {
            value += multiplier * letter_id(bytes[i]);
            multiplier = multiplier.wrapping_mul(TOKEN_RADIX);
            i += 1;
        }
        Token(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::from_str_const(s)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.0;
        let mut out = String::with_capacity(MAX_TOKEN_LENGTH);
        while rest != 0 {
            let letter = LETTERS[(rest % TOKEN_RADIX) as usize];
            if letter == 0 {
                break;
            }
            out.push(letter as char);
            rest /= TOKEN_RADIX;
        }
        f.write_str(&out)
    }
}
