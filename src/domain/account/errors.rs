use crate::domain::money::Money;
use super::value_objects::AccountRole;

// ============================================================================
// Account Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("An account with email {0} already exists")]
    EmailTaken(String),

    #[error("Account already has the {0} role")]
    RoleAlreadyHeld(AccountRole),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is deactivated")]
    Inactive,

    #[error("Payout amount must be positive")]
    InvalidAmount,

    #[error("Payout of {requested} exceeds pending earnings of {available}")]
    InsufficientEarnings { requested: Money, available: Money },
}
