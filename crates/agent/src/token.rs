//! Token estimation.
//!
//! Uses a character-based heuristic: ~4 characters per token, rounded up.
//! Characters, not bytes, so non-ASCII text is not over-counted.

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
    chars.div_ceil(4)
}
