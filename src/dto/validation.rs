//! Validation helpers for DTOs.

use validator::ValidationError;

const NAME_MAX_CHARS: usize = 20;
const AVATAR_MAX_CHARS: usize = 16;
const CATEGORY_MAX_CHARS: usize = 40;

fn error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn check_length(
    value: &str,
    max: usize,
    code: &'static str,
    label: &str,
) -> Result<(), ValidationError> {
    let count = value.chars().count();
    if count == 0 || count > max {
        return Err(error(
            code,
            format!("{label} must be 1 to {max} characters (got {count})"),
        ));
    }
    Ok(())
}

/// Player names: 1 to 20 letters, digits, spaces, `_`, `-` or `.`, not blank.
///
/// ```ignore
/// validate_player_name("Player_1") // Ok
/// validate_player_name("   ")      // Err - blank
/// validate_player_name("<script>") // Err - charset
/// ```
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    check_length(name, NAME_MAX_CHARS, "name_length", "Name")?;

    if name.trim().is_empty() {
        return Err(error("name_blank", "Name must not be blank".into()));
    }

    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-' | '.'))
    {
        return Err(error(
            "name_charset",
            "Name may only contain letters, digits, spaces, '_', '-' and '.'".into(),
        ));
    }

    Ok(())
}

/// Avatars: 1 to 16 characters, typically an emoji, without whitespace or control characters.
pub fn validate_avatar(avatar: &str) -> Result<(), ValidationError> {
    check_length(avatar, AVATAR_MAX_CHARS, "avatar_length", "Avatar")?;

    if avatar.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(error(
            "avatar_charset",
            "Avatar must not contain whitespace or control characters".into(),
        ));
    }

    Ok(())
}

/// Categories: 1 to 40 printable characters.
pub fn validate_category(category: &str) -> Result<(), ValidationError> {
    check_length(category, CATEGORY_MAX_CHARS, "category_length", "Category")?;

    if category.trim().is_empty() || category.chars().any(char::is_control) {
        return Err(error(
            "category_charset",
            "Category must be printable and not blank".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_player_name_valid() {
        assert!(validate_player_name("Alice").is_ok());
        assert!(validate_player_name("bob_the-2nd.").is_ok());
        assert!(validate_player_name("Zoë 99").is_ok());
        assert!(validate_player_name("abcdefghijklmnopqrst").is_ok());
    }

    #[test]
    fn test_validate_player_name_invalid() {
        assert!(validate_player_name("").is_err());
        assert!(validate_player_name("   ").is_err());
        assert!(validate_player_name("abcdefghijklmnopqrstu").is_err()); // 21 chars
        assert!(validate_player_name("<b>bold</b>").is_err());
        assert!(validate_player_name("tab\there").is_err());
    }

    #[test]
    fn test_validate_avatar() {
        assert!(validate_avatar("🦊").is_ok());
        assert!(validate_avatar("robot-3").is_ok());
        assert!(validate_avatar("").is_err());
        assert!(validate_avatar("two words").is_err());
        assert!(validate_avatar("\u{7}").is_err());
        assert!(validate_avatar("abcdefghijklmnopq").is_err()); // 17 chars
    }

    #[test]
    fn test_validate_category() {
        assert!(validate_category("video_games").is_ok());
        assert!(validate_category("any").is_ok());
        assert!(validate_category("").is_err());
        assert!(validate_category("  ").is_err());
        assert!(validate_category(&"x".repeat(41)).is_err());
    }
}
