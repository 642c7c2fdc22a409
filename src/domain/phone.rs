use crate::error::PaymentError;

/// Normalizes a user-entered phone number into the `+254...` form the
/// payment gateway expects.
///
/// Total over any non-empty input: whitespace is stripped, a leading `0` is
/// swapped for `+254`, a bare `254...` gains its `+`, an existing `+` prefix
/// is kept as-is, and anything else is treated as a Kenyan local number
/// missing its leading zero.
pub fn normalize(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(rest) = cleaned.strip_prefix('0') {
        format!("+254{rest}")
    } else if cleaned.starts_with('+') {
        cleaned
    } else if cleaned.starts_with("254") {
        format!("+{cleaned}")
    } else {
        format!("+254{cleaned}")
    }
}

/// Shape check applied at the form boundary before submission.
///
/// The normalizer itself never rejects input; callers that accept free-form
/// text run this first so a malformed number surfaces inline instead of as a
/// gateway rejection.
pub fn validate(raw: &str) -> Result<(), PaymentError> {
    let normalized = normalize(raw);
    let digits = &normalized[1..];
    if digits.len() < 10 || digits.len() > 14 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(PaymentError::Validation(format!(
            "invalid phone number: {raw}"
        )));
    }
    Ok(())
}
