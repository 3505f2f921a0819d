//! Pairing code generation and formatting
//!
//! Codes are six decimal digits drawn from `100000..=999999`, so they never
//! start with a zero and always render at full width.

use codepair_core::CODE_LENGTH;
use rand::rngs::OsRng;
use rand::Rng;

/// Smallest code that can be issued
pub const CODE_MIN: u32 = 100_000;

/// Largest code that can be issued
pub const CODE_MAX: u32 = 999_999;

/// Source of candidate pairing codes
pub trait CodeSource: Send + 'static {
    /// Next candidate in `CODE_MIN..=CODE_MAX`
    fn next_code(&mut self) -> u32;
}

/// Uniform candidates from the operating system CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&mut self) -> u32 {
        OsRng.gen_range(CODE_MIN..=CODE_MAX)
    }
}

/// Remove every whitespace character from user input
///
/// Users often type the displayed `123 456` form.
pub fn normalize_code(input: &str) -> String {
    input.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Whether `code` is exactly six ASCII digits
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

/// Display form with a space in the middle (`123 456`)
pub fn format_code(code: &str) -> String {
    if !is_well_formed(code) {
        return code.to_string();
    }
    let (head, tail) = code.split_at(CODE_LENGTH / 2);
    format!("{} {}", head, tail)
}
