//! AYUSH patient identifier canonicalization
//!
//! Free-form keystrokes are normalized into `AY` followed by up to five
//! digits as the user types. The output is always one of `""`, `"AY"` or
//! `AY\d{1,5}`, and canonicalizing a canonical value is a no-op.

/// Fixed two-letter identifier prefix
pub const IDENTIFIER_PREFIX: &str = "AY";

/// Number of digits in a complete identifier
pub const IDENTIFIER_DIGITS: usize = 5;

/// Message shown for a value that is not a complete identifier
pub const IDENTIFIER_FORMAT_MESSAGE: &str =
    "AYUSH ID must be in format: AY followed by exactly 5 digits (e.g., AY00001)";

/// Canonicalize an identifier buffer
///
/// # Examples
///
/// ```
/// use ayush_client::services::identifier::canonicalize;
///
/// assert_eq!(canonicalize("ay-001"), "AY001");
/// assert_eq!(canonicalize("a12"), "AY12");
/// assert_eq!(canonicalize("123456"), "AY12345");
/// ```
pub fn canonicalize(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    let prefixed = if cleaned.is_empty() || cleaned.starts_with(IDENTIFIER_PREFIX) {
        cleaned
    } else if let Some(rest) = cleaned.strip_prefix('A') {
        format!("{}{}", IDENTIFIER_PREFIX, rest)
    } else {
        format!("{}{}", IDENTIFIER_PREFIX, cleaned)
    };

    let truncated: String = prefixed
        .chars()
        .take(IDENTIFIER_PREFIX.len() + IDENTIFIER_DIGITS)
        .collect();

    if truncated.len() <= IDENTIFIER_PREFIX.len() {
        return truncated;
    }

    // Prefix and remainder are ASCII here, so byte slicing is safe
    let digits: String = truncated[IDENTIFIER_PREFIX.len()..]
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    format!("{}{}", IDENTIFIER_PREFIX, digits)
}

/// Canonicalize after appending the next edit to the previous canonical value
pub fn apply_keystroke(previous: &str, input: &str) -> String {
    let mut buffer = String::with_capacity(previous.len() + input.len());
    buffer.push_str(previous);
    buffer.push_str(input);
    canonicalize(&buffer)
}

/// True iff the value is exactly the prefix followed by five digits
pub fn is_valid(value: &str) -> bool {
    match value.strip_prefix(IDENTIFIER_PREFIX) {
        Some(digits) => {
            digits.len() == IDENTIFIER_DIGITS && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Validate a complete identifier, returning the fixed format message on rejection
pub fn validate(value: &str) -> Result<(), &'static str> {
    if is_valid(value) {
        Ok(())
    } else {
        Err(IDENTIFIER_FORMAT_MESSAGE)
    }
}
