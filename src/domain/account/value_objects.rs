use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::AccountError;

// ============================================================================
// Account Value Objects
// ============================================================================

/// Login email, trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, AccountError> {
        let email = raw.trim().to_lowercase();
        if email.is_empty() {
            return Err(AccountError::EmptyField("email"));
        }

        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !email.contains(char::is_whitespace)
            }
            None => false,
        };

        if !valid {
            return Err(AccountError::InvalidEmail(email));
        }
        Ok(Self(email))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = AccountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Email::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    Customer,
    Publisher,
    Admin,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Customer => "customer",
            AccountRole::Publisher => "publisher",
            AccountRole::Admin => "admin",
        }
    }
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(AccountRole::Customer),
            "publisher" => Ok(AccountRole::Publisher),
            "admin" => Ok(AccountRole::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Admin permission that gates managing accounts: creating admins,
/// (de)activating users, verifying publishers and the user rosters.
pub const USER_MANAGEMENT: &str = "user-management";

/// Admin permission for account statistics.
pub const ANALYTICS_VIEW: &str = "analytics-view";

/// Every permission an admin can hold.
pub const ADMIN_PERMISSIONS: [&str; 8] = [
    USER_MANAGEMENT,
    "book-management",
    "order-management",
    "content-moderation",
    ANALYTICS_VIEW,
    "system-settings",
    "payment-management",
    "support-tickets",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalized() {
        let email = Email::parse("  Juan.DelaCruz@Example.PH ").unwrap();
        assert_eq!(email.as_str(), "juan.delacruz@example.ph");
    }

    #[test]
    fn test_email_rejects_malformed() {
        for raw in ["", "no-at-sign", "@example.com", "a@localhost", "a@.com", "a b@example.com"] {
            assert!(Email::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_email_deserialize_validates() {
        assert!(serde_json::from_str::<Email>("\"x@y.co\"").is_ok());
        assert!(serde_json::from_str::<Email>("\"nope\"").is_err());
    }

    #[test]
    fn test_role_text_round_trip() {
        for role in [AccountRole::Customer, AccountRole::Publisher, AccountRole::Admin] {
            assert_eq!(role.as_str().parse::<AccountRole>().unwrap(), role);
        }
    }
}
