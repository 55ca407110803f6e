use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::account::AccountRole;

// ============================================================================
// Sessions - opaque bearer tokens, stored only as hashes
// ============================================================================

/// Everything the HTTP layer needs to authorize a request.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionPrincipal {
    pub user_id: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub is_active: bool,
    pub customer_id: Option<Uuid>,
    pub publisher_id: Option<Uuid>,
    pub admin_id: Option<Uuid>,
    pub admin_permissions: Option<Vec<String>>,
}

impl SessionPrincipal {
    pub fn has_role(&self, role: AccountRole) -> bool {
        self.roles.iter().any(|r| r == role.as_str())
    }

    pub fn is_admin(&self) -> bool {
        self.admin_id.is_some() && self.has_role(AccountRole::Admin)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.admin_permissions
            .as_ref()
            .is_some_and(|perms| perms.iter().any(|p| p == permission))
    }
}

const PRINCIPAL_SELECT: &str = "SELECT u.id AS user_id, u.email, u.roles, u.is_active,
            c.id AS customer_id, p.id AS publisher_id, a.id AS admin_id,
            a.permissions AS admin_permissions
     FROM users u
     LEFT JOIN customers c ON c.user_id = u.id
     LEFT JOIN publishers p ON p.user_id = u.id
     LEFT JOIN admins a ON a.user_id = u.id";

pub async fn create(pool: &PgPool, token_hash: &str, user_id: Uuid, expires_at: DateTime<Utc>) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO sessions (token_hash, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await?;
    Ok(())
}

/// Resolve an unexpired session to its principal.
pub async fn find_principal(pool: &PgPool, token_hash: &str) -> sqlx::Result<Option<SessionPrincipal>> {
    sqlx::query_as(&format!(
        "{PRINCIPAL_SELECT}
         JOIN sessions s ON s.user_id = u.id
         WHERE s.token_hash = $1 AND s.expires_at > NOW()"
    ))
    .bind(token_hash)
    .fetch_optional(pool)
    .await
}

pub async fn revoke(pool: &PgPool, token_hash: &str) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn revoke_all(pool: &PgPool, user_id: Uuid) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn purge_expired(pool: &PgPool) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(roles: &[&str], admin_permissions: Option<Vec<String>>) -> SessionPrincipal {
        SessionPrincipal {
            user_id: Uuid::new_v4(),
            email: "reader@example.com".into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            is_active: true,
            customer_id: None,
            publisher_id: None,
            admin_id: admin_permissions.as_ref().map(|_| Uuid::new_v4()),
            admin_permissions,
        }
    }

    #[test]
    fn test_admin_requires_profile_and_role() {
        let tagged_only = principal(&["admin"], None);
        assert!(!tagged_only.is_admin());

        let admin = principal(&["customer", "admin"], Some(vec!["user-management".into()]));
        assert!(admin.is_admin());
        assert!(admin.has_role(AccountRole::Customer));
        assert!(admin.has_permission("user-management"));
        assert!(!admin.has_permission("payments"));
    }
}
