use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::domain::account::{AccountRole, AdminProfile, Email, PublisherProfile};
use super::books::escape_like;

// ============================================================================
// Users & role profiles
// ============================================================================

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, display_name, \
     phone_numbers, avatar_url, roles, is_active, email_verified, phone_verified, \
     last_login, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub display_name: Option<String>,
    pub phone_numbers: Vec<String>,
    pub avatar_url: Option<String>,
    pub roles: Vec<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn roles(&self) -> Vec<AccountRole> {
        self.roles.iter().filter_map(|r| r.parse().ok()).collect()
    }

    pub fn has_role(&self, role: AccountRole) -> bool {
        self.roles.iter().any(|r| r == role.as_str())
    }
}

/// What clients see of a user; never includes the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub display_name: Option<String>,
    pub phone_numbers: Vec<String>,
    pub avatar_url: Option<String>,
    pub roles: Vec<AccountRole>,
    pub is_active: bool,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            display_name: user.display_name.clone(),
            phone_numbers: user.phone_numbers.clone(),
            avatar_url: user.avatar_url.clone(),
            roles: user.roles(),
            is_active: user.is_active,
            email_verified: user.email_verified,
            phone_verified: user.phone_verified,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a Email,
    pub password_hash: &'a str,
    pub full_name: &'a str,
    pub phone_numbers: &'a [String],
    pub role: AccountRole,
}

pub async fn find_by_email<'e, E: PgExecutor<'e>>(
    executor: E,
    email: &Email,
) -> sqlx::Result<Option<UserRecord>> {
    sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(email.as_str())
        .fetch_optional(executor)
        .await
}

pub async fn find_by_id<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> sqlx::Result<Option<UserRecord>> {
    sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn email_exists(pool: &PgPool, email: &Email) -> sqlx::Result<bool> {
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
        .bind(email.as_str())
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

pub async fn insert(conn: &mut PgConnection, user: NewUser<'_>) -> sqlx::Result<UserRecord> {
    sqlx::query_as(&format!(
        "INSERT INTO users (id, username, email, password_hash, full_name, phone_numbers, roles)
         VALUES ($1, $2, $3, $4, $5, $6, ARRAY[$7])
         RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(user.username)
    .bind(user.email.as_str())
    .bind(user.password_hash)
    .bind(user.full_name)
    .bind(user.phone_numbers)
    .bind(user.role.as_str())
    .fetch_one(conn)
    .await
}

/// Add a role tag; no-op when already present.
pub async fn add_role(conn: &mut PgConnection, user_id: Uuid, role: AccountRole) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE users SET roles = array_append(roles, $2), updated_at = NOW()
         WHERE id = $1 AND NOT ($2 = ANY (roles))",
    )
    .bind(user_id)
    .bind(role.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert_customer(conn: &mut PgConnection, user_id: Uuid) -> sqlx::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as("INSERT INTO customers (id, user_id) VALUES ($1, $2) RETURNING id")
        .bind(Uuid::now_v7())
        .bind(user_id)
        .fetch_one(conn)
        .await?;
    Ok(id)
}

pub async fn insert_publisher(
    conn: &mut PgConnection,
    user_id: Uuid,
    profile: &PublisherProfile,
) -> sqlx::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO publishers (id, user_id, pen_name, biography, website, genres)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(&profile.pen_name)
    .bind(&profile.biography)
    .bind(&profile.website)
    .bind(&profile.genres)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn insert_admin(conn: &mut PgConnection, user_id: Uuid, profile: &AdminProfile) -> sqlx::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO admins (id, user_id, admin_level, permissions, department)
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(&profile.admin_level)
    .bind(&profile.permissions)
    .bind(&profile.department)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    display_name: Option<&str>,
    phone_numbers: Option<&[String]>,
) -> sqlx::Result<UserRecord> {
    sqlx::query_as(&format!(
        "UPDATE users SET
            display_name = COALESCE($2, display_name),
            phone_numbers = COALESCE($3, phone_numbers),
            updated_at = NOW()
         WHERE id = $1
         RETURNING {USER_COLUMNS}"
    ))
    .bind(user_id)
    .bind(display_name)
    .bind(phone_numbers)
    .fetch_one(pool)
    .await
}

pub async fn update_password(pool: &PgPool, user_id: Uuid, password_hash: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .bind(password_hash)
        .execute(pool)
        .await?;
    Ok(())
}

/// Replace the avatar URL, returning the previous one so its file can be removed.
pub async fn set_avatar(pool: &PgPool, user_id: Uuid, avatar_url: Option<&str>) -> sqlx::Result<Option<String>> {
    let (previous,): (Option<String>,) = sqlx::query_as(
        "UPDATE users u SET avatar_url = $2, updated_at = NOW()
         FROM (SELECT id, avatar_url FROM users WHERE id = $1 FOR UPDATE) old
         WHERE u.id = old.id
         RETURNING old.avatar_url",
    )
    .bind(user_id)
    .bind(avatar_url)
    .fetch_one(pool)
    .await?;
    Ok(previous)
}

pub async fn touch_last_login(pool: &PgPool, user_id: Uuid) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Returns false when no such user exists.
pub async fn set_active(pool: &PgPool, user_id: Uuid, active: bool) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .bind(active)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn admin_exists(pool: &PgPool) -> sqlx::Result<bool> {
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM admins)")
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

/// Case-insensitive match on username, email or full name among active
/// users, newest first, with the total number of matches.
pub async fn search(
    pool: &PgPool,
    query: &str,
    role: Option<AccountRole>,
    limit: i64,
    offset: i64,
) -> sqlx::Result<(Vec<UserRecord>, i64)> {
    const MATCHES: &str = "is_active
         AND (username ILIKE $1 OR email ILIKE $1 OR full_name ILIKE $1)
         AND ($2::TEXT IS NULL OR $2 = ANY (roles))";

    let pattern = format!("%{}%", escape_like(query));
    let role = role.map(|r| r.as_str());

    let users = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE {MATCHES}
         ORDER BY created_at DESC LIMIT $3 OFFSET $4"
    ))
    .bind(&pattern)
    .bind(role)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM users WHERE {MATCHES}"))
        .bind(&pattern)
        .bind(role)
        .fetch_one(pool)
        .await?;

    Ok((users, total))
}

/// Account counts for one role.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RoleStats {
    pub role: String,
    pub total: i64,
    pub active: i64,
    pub this_month: i64,
    pub email_verified: i64,
}

/// Per-role totals; `this_month` counts accounts created since the first of
/// the current month.
pub async fn role_stats(pool: &PgPool) -> sqlx::Result<Vec<RoleStats>> {
    sqlx::query_as(
        "SELECT r.role,
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE u.is_active) AS active,
                COUNT(*) FILTER (WHERE u.created_at >= date_trunc('month', NOW())) AS this_month,
                COUNT(*) FILTER (WHERE u.email_verified) AS email_verified
         FROM users u CROSS JOIN LATERAL unnest(u.roles) AS r(role)
         GROUP BY r.role
         ORDER BY r.role",
    )
    .fetch_all(pool)
    .await
}
