//! Input validators applied at the service boundary.
//!
//! Usernames are restricted to ASCII letters, digits, and underscores.
//! Passwords must be at least [`MIN_PASSWORD_LEN`] characters and contain an
//! uppercase letter, a lowercase letter, a digit, and one of
//! [`PASSWORD_SPECIAL_CHARS`].

use serde::Deserialize;

use crate::error::ValidationError;

/// Minimum accepted password length in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Characters that satisfy the special-character password rule.
pub const PASSWORD_SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

/// A monetary amount as sent by clients: a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

impl From<f64> for AmountInput {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for AmountInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Validate a username.
///
/// # Errors
///
/// - [`ValidationError::Missing`] if the username is empty.
/// - [`ValidationError::InvalidUsername`] on any character outside `[A-Za-z0-9_]`.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::Missing { field: "username" });
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ValidationError::InvalidUsername);
    }
    Ok(())
}

/// Validate password strength.
///
/// # Errors
///
/// - [`ValidationError::Missing`] if the password is empty.
/// - [`ValidationError::PasswordTooShort`] below [`MIN_PASSWORD_LEN`] characters.
/// - [`ValidationError::WeakPassword`] if a character class is missing.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Missing { field: "password" });
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c));

    if !(has_upper && has_lower && has_digit && has_special) {
        return Err(ValidationError::WeakPassword);
    }
    Ok(())
}

/// Validate an entry name and return it trimmed.
///
/// # Errors
///
/// Returns [`ValidationError::Missing`] if the name is empty or whitespace.
pub fn validate_entry_name<'a>(
    name: &'a str,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    Ok(trimmed)
}

/// Parse and validate an amount.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidAmount`] unless the input is a finite
/// number strictly greater than zero.
pub fn parse_amount(input: &AmountInput, field: &'static str) -> Result<f64, ValidationError> {
    let value = match input {
        AmountInput::Number(n) => *n,
        AmountInput::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ValidationError::InvalidAmount { field })?,
    };

    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::InvalidAmount { field });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_accepts_letters_digits_underscore() {
        assert_eq!(validate_username("Jane_Doe42"), Ok(()));
    }

    #[test]
    fn username_rejects_empty_and_symbols() {
        assert_eq!(
            validate_username(""),
            Err(ValidationError::Missing { field: "username" })
        );
        assert_eq!(
            validate_username("jane.doe"),
            Err(ValidationError::InvalidUsername)
        );
        assert_eq!(
            validate_username("jané"),
            Err(ValidationError::InvalidUsername)
        );
    }

    #[test]
    fn password_rules() {
        assert_eq!(validate_password("Str0ng!pw"), Ok(()));
        assert_eq!(
            validate_password("S0!a"),
            Err(ValidationError::PasswordTooShort { min: 8 })
        );
        assert_eq!(
            validate_password("alllowercase1!"),
            Err(ValidationError::WeakPassword)
        );
        assert_eq!(
            validate_password("NoDigitsHere!"),
            Err(ValidationError::WeakPassword)
        );
        assert_eq!(
            validate_password("NoSpecial123"),
            Err(ValidationError::WeakPassword)
        );
    }

    #[test]
    fn entry_name_is_trimmed() {
        assert_eq!(validate_entry_name("  Rent ", "expenseName"), Ok("Rent"));
        assert_eq!(
            validate_entry_name("   ", "expenseName"),
            Err(ValidationError::Missing {
                field: "expenseName"
            })
        );
    }

    #[test]
    fn amount_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_amount(&1200.0.into(), "amount"), Ok(1200.0));
        assert_eq!(parse_amount(&" 12.50 ".into(), "amount"), Ok(12.5));
    }

    #[test]
    fn amount_rejects_non_positive_and_non_numeric() {
        let bad: [AmountInput; 6] = [
            0.0.into(),
            (-5.0).into(),
            "abc".into(),
            "".into(),
            "NaN".into(),
            "inf".into(),
        ];
        for input in &bad {
            assert_eq!(
                parse_amount(input, "amount"),
                Err(ValidationError::InvalidAmount { field: "amount" }),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn amount_input_deserializes_from_number_or_string() {
        let n: AmountInput = serde_json::from_str("42.5").unwrap_or(AmountInput::Number(0.0));
        let s: AmountInput =
            serde_json::from_str("\"42.5\"").unwrap_or(AmountInput::Number(0.0));
        assert_eq!(n, AmountInput::Number(42.5));
        assert_eq!(s, AmountInput::Text("42.5".to_owned()));
    }
}
