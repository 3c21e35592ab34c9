//! Validation helpers for DTOs.
//!
//! Services call the same helpers so that requests not coming through the HTTP layer
//! are held to the same rules.

use validator::ValidationError;

/// Longest display name accepted, in characters, after trimming.
pub const DISPLAY_NAME_MAX_CHARS: usize = 50;
/// Longest chat message accepted, in characters, after trimming.
pub const CHAT_MESSAGE_MAX_CHARS: usize = 500;
/// Length of a join code.
pub const JOIN_CODE_LEN: usize = 6;

fn error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Display names must contain something besides whitespace and stay reasonably short.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(error(
            "display_name_empty",
            "Display name must not be empty".into(),
        ));
    }
    let chars = trimmed.chars().count();
    if chars > DISPLAY_NAME_MAX_CHARS {
        return Err(error(
            "display_name_length",
            format!("Display name must be at most {DISPLAY_NAME_MAX_CHARS} characters (got {chars})"),
        ));
    }
    Ok(())
}

/// Join codes are 6 ASCII alphanumerics; case is ignored.
///
/// # Examples
///
/// ```ignore
/// validate_join_code("AB12CD") // Ok
/// validate_join_code(" ab12cd ") // Ok - trimmed, case-insensitive
/// validate_join_code("AB12")   // Err - too short
/// ```
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(error("join_code_empty", "Join code must not be empty".into()));
    }
    if trimmed.len() != JOIN_CODE_LEN || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(error(
            "join_code_format",
            format!("Join code must be {JOIN_CODE_LEN} letters or digits"),
        ));
    }
    Ok(())
}

pub fn validate_vote_threshold(threshold: f64) -> Result<(), ValidationError> {
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(())
    } else {
        Err(error(
            "vote_threshold_range",
            format!("Vote threshold must be in (0, 1] (got {threshold})"),
        ))
    }
}

pub fn validate_chat_message(message: &str) -> Result<(), ValidationError> {
    let chars = message.trim().chars().count();
    if chars == 0 {
        return Err(error("message_empty", "Message must not be empty".into()));
    }
    if chars > CHAT_MESSAGE_MAX_CHARS {
        return Err(error(
            "message_length",
            format!("Message must be at most {CHAT_MESSAGE_MAX_CHARS} characters (got {chars})"),
        ));
    }
    Ok(())
}

/// Canonical form of a join code: trimmed and uppercased.
pub fn normalize_join_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
