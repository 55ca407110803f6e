use serde::Deserialize;

use crate::domain::money::Money;
use super::errors::AccountError;
use super::value_objects::Email;

// ============================================================================
// Registration & Profile Rules
// ============================================================================

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: String,
    #[serde(default)]
    pub phone_numbers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ValidRegistration {
    pub username: String,
    pub email: Email,
    pub password: String,
    pub full_name: String,
    pub phone_numbers: Vec<String>,
}

impl Registration {
    pub fn validate(self) -> Result<ValidRegistration, AccountError> {
        let username = required("username", &self.username)?;
        let full_name = required("full name", &self.full_name)?;
        let email = Email::parse(&self.email)?;
        validate_new_password(&self.password, &self.confirm_password)?;

        let phone_numbers = self
            .phone_numbers
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        Ok(ValidRegistration {
            username,
            email,
            password: self.password,
            full_name,
            phone_numbers,
        })
    }
}

pub fn validate_new_password(password: &str, confirm: &str) -> Result<(), AccountError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AccountError::WeakPassword(MIN_PASSWORD_LEN));
    }
    if password != confirm {
        return Err(AccountError::PasswordMismatch);
    }
    Ok(())
}

/// Publisher-specific profile fields.
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherProfile {
    pub pen_name: String,
    #[serde(default)]
    pub biography: String,
    pub website: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl PublisherProfile {
    pub fn validate(mut self) -> Result<Self, AccountError> {
        self.pen_name = required("pen name", &self.pen_name)?;
        self.genres = normalize_genres(self.genres);
        Ok(self)
    }
}

/// Lowercased, trimmed, sorted and free of blanks and repeats.
pub fn normalize_genres(genres: Vec<String>) -> Vec<String> {
    let mut genres: Vec<String> = genres
        .into_iter()
        .map(|g| g.trim().to_lowercase())
        .filter(|g| !g.is_empty())
        .collect();
    genres.sort_unstable();
    genres.dedup();
    genres
}

/// Admin-specific profile fields.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminProfile {
    #[serde(default = "default_admin_level")]
    pub admin_level: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub department: Option<String>,
}

fn default_admin_level() -> String {
    "moderator".to_string()
}

/// A payout may not exceed what the publisher has pending.
pub fn check_payout(amount: Money, pending: Money) -> Result<(), AccountError> {
    if amount.is_negative() || amount.is_zero() {
        return Err(AccountError::InvalidAmount);
    }
    if amount > pending {
        return Err(AccountError::InsufficientEarnings {
            requested: amount,
            available: pending,
        });
    }
    Ok(())
}

fn required(field: &'static str, value: &str) -> Result<String, AccountError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AccountError::EmptyField(field));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> Registration {
        Registration {
            username: "juan".into(),
            email: "Juan@Example.com".into(),
            password: "s3cret-pass".into(),
            confirm_password: "s3cret-pass".into(),
            full_name: "Juan dela Cruz".into(),
            phone_numbers: vec!["0917 000 0000".into(), "  ".into()],
        }
    }

    #[test]
    fn test_valid_registration() {
        let valid = registration().validate().unwrap();
        assert_eq!(valid.email.as_str(), "juan@example.com");
        assert_eq!(valid.phone_numbers, vec!["0917 000 0000".to_string()]);
    }

    #[test]
    fn test_short_password() {
        let mut r = registration();
        r.password = "short".into();
        r.confirm_password = "short".into();
        assert!(matches!(r.validate(), Err(AccountError::WeakPassword(8))));
    }

    #[test]
    fn test_password_mismatch() {
        let mut r = registration();
        r.confirm_password = "different-pass".into();
        assert!(matches!(r.validate(), Err(AccountError::PasswordMismatch)));
    }

    #[test]
    fn test_blank_username() {
        let mut r = registration();
        r.username = "   ".into();
        assert!(matches!(r.validate(), Err(AccountError::EmptyField("username"))));
    }

    #[test]
    fn test_publisher_profile_normalizes_genres() {
        let profile = PublisherProfile {
            pen_name: " Ka Amado ".into(),
            biography: String::new(),
            website: None,
            genres: vec!["Poetry".into(), "poetry".into(), " ".into()],
        }
        .validate()
        .unwrap();
        assert_eq!(profile.pen_name, "Ka Amado");
        assert_eq!(profile.genres, vec!["poetry".to_string()]);
    }

    #[test]
    fn test_genre_repeats_removed_wherever_they_appear() {
        let genres = normalize_genres(vec![
            "Poetry".into(),
            "History".into(),
            " poetry ".into(),
            "history".into(),
        ]);
        assert_eq!(genres, vec!["history".to_string(), "poetry".to_string()]);
    }

    #[test]
    fn test_payout_limits() {
        let pending = Money::from_cents(10_000);
        assert!(check_payout(Money::from_cents(10_000), pending).is_ok());
        assert!(matches!(
            check_payout(Money::from_cents(10_001), pending),
            Err(AccountError::InsufficientEarnings { .. })
        ));
        assert!(matches!(check_payout(Money::ZERO, pending), Err(AccountError::InvalidAmount)));
    }

    #[test]
    fn test_admin_profile_defaults() {
        let profile: AdminProfile = serde_json::from_str("{}").unwrap();
        assert_eq!(profile.admin_level, "moderator");
        assert!(profile.permissions.is_empty());
    }
}
