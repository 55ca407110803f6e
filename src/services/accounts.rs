use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::{BootstrapAdmin, SessionConfig};
use crate::db;
use crate::db::customers::CustomerSummary;
use crate::db::sessions::SessionPrincipal;
use crate::db::users::{NewUser, RoleStats, UserProfile, UserRecord};
use crate::domain::account::{
    validate_new_password, AccountError, AccountRole, AdminProfile, Email, PublisherProfile, Registration,
    ValidRegistration, ADMIN_PERMISSIONS, USER_MANAGEMENT,
};
use crate::domain::catalog::Book;
use crate::domain::order::OrderAggregate;
use crate::error::{AppError, AppResult};
use crate::storage::{UploadKind, UploadStore};

use super::auth;

// ============================================================================
// Account Service - registration, sessions, profiles and wishlists
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct ValidatedUser {
    pub user: UserProfile,
    pub subscription_plan: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub phone_numbers: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct Paging {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Paging {
    /// Limit clamped to `1..=MAX_PAGE_SIZE` and a non-negative offset.
    pub fn resolve(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (limit, self.offset.unwrap_or(0).max(0))
    }
}

#[derive(Debug, Deserialize)]
pub struct UserSearch {
    pub q: Option<String>,
    #[serde(alias = "userType")]
    pub user_type: Option<AccountRole>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: CustomerSummary,
    pub wishlist: Vec<Book>,
    pub orders: Vec<OrderAggregate>,
}

pub struct AccountService {
    pool: PgPool,
    sessions: SessionConfig,
    uploads: Arc<UploadStore>,
}

impl AccountService {
    pub fn new(pool: PgPool, sessions: SessionConfig, uploads: Arc<UploadStore>) -> Self {
        Self { pool, sessions, uploads }
    }

    /// Register a customer. An existing account that proves its password
    /// gains the customer role instead.
    pub async fn register_customer(&self, registration: Registration) -> AppResult<UserProfile> {
        let registration = registration.validate()?;
        let mut tx = self.pool.begin().await?;

        let user = match db::users::find_by_email(&mut *tx, &registration.email).await? {
            Some(existing) if existing.has_role(AccountRole::Customer) => {
                return Err(AccountError::EmailTaken(registration.email.to_string()).into());
            }
            Some(existing) => {
                let verified =
                    auth::verify_password(registration.password.clone(), existing.password_hash.clone()).await?;
                if !verified {
                    return Err(AccountError::EmailTaken(registration.email.to_string()).into());
                }
                db::users::add_role(&mut tx, existing.id, AccountRole::Customer).await?;
                existing
            }
            None => self.insert_user(&mut tx, &registration, AccountRole::Customer).await?,
        };
        db::users::insert_customer(&mut tx, user.id).await?;

        let user = db::users::find_by_id(&mut *tx, user.id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, email = %user.email, "👤 Customer registered");
        Ok(UserProfile::from(&user))
    }

    /// New account with the publisher role. Existing accounts must upgrade
    /// from a logged-in session instead.
    pub async fn register_publisher(
        &self,
        registration: Registration,
        profile: PublisherProfile,
    ) -> AppResult<UserProfile> {
        let registration = registration.validate()?;
        let profile = profile.validate()?;

        if db::users::email_exists(&self.pool, &registration.email).await? {
            return Err(AppError::conflict(format!(
                "An account with email {} already exists. Log in and upgrade to a publisher account instead",
                registration.email
            )));
        }

        let mut tx = self.pool.begin().await?;
        let user = self.insert_user(&mut tx, &registration, AccountRole::Publisher).await?;
        let publisher_id = db::users::insert_publisher(&mut tx, user.id, &profile).await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, publisher_id = %publisher_id, "📚 Publisher registered");
        Ok(UserProfile::from(&user))
    }

    pub async fn upgrade_to_publisher(
        &self,
        principal: &SessionPrincipal,
        profile: PublisherProfile,
    ) -> AppResult<UserProfile> {
        if principal.publisher_id.is_some() {
            return Err(AccountError::RoleAlreadyHeld(AccountRole::Publisher).into());
        }
        let profile = profile.validate()?;

        let mut tx = self.pool.begin().await?;
        db::users::add_role(&mut tx, principal.user_id, AccountRole::Publisher).await?;
        let publisher_id = db::users::insert_publisher(&mut tx, principal.user_id, &profile).await?;
        let user = db::users::find_by_id(&mut *tx, principal.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, publisher_id = %publisher_id, "📚 Account upgraded to publisher");
        Ok(UserProfile::from(&user))
    }

    /// Only admins holding the user-management permission create admins.
    pub async fn register_admin(
        &self,
        creator: &SessionPrincipal,
        registration: Registration,
        profile: AdminProfile,
    ) -> AppResult<UserProfile> {
        if !creator.is_admin() || !creator.has_permission(USER_MANAGEMENT) {
            return Err(AppError::forbidden("Requires the user-management permission"));
        }
        let registration = registration.validate()?;

        if db::users::email_exists(&self.pool, &registration.email).await? {
            return Err(AccountError::EmailTaken(registration.email.to_string()).into());
        }

        let mut tx = self.pool.begin().await?;
        let user = self.insert_user(&mut tx, &registration, AccountRole::Admin).await?;
        let admin_id = db::users::insert_admin(&mut tx, user.id, &profile).await?;
        tx.commit().await?;

        tracing::info!(
            user_id = %user.id,
            admin_id = %admin_id,
            created_by = %creator.user_id,
            level = %profile.admin_level,
            "🛡️ Admin registered"
        );
        Ok(UserProfile::from(&user))
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<LoginResponse> {
        let email = Email::parse(&request.email).map_err(|_| AccountError::InvalidCredentials)?;
        let user = db::users::find_by_email(&self.pool, &email)
            .await?
            .ok_or(AccountError::InvalidCredentials)?;

        if !auth::verify_password(request.password, user.password_hash.clone()).await? {
            tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
            return Err(AccountError::InvalidCredentials.into());
        }
        if !user.is_active {
            return Err(AccountError::Inactive.into());
        }

        let ttl = if request.remember_me {
            self.sessions.remember_me_ttl
        } else {
            self.sessions.ttl
        };
        let expires_at = Utc::now() + ttl;
        let issued = auth::issue_token();
        db::sessions::create(&self.pool, &issued.hash, user.id, expires_at).await?;
        db::users::touch_last_login(&self.pool, user.id).await?;

        tracing::info!(user_id = %user.id, remember_me = request.remember_me, "🔑 User logged in");
        Ok(LoginResponse {
            token: issued.token,
            expires_at,
            user: UserProfile::from(&user),
        })
    }

    pub async fn logout(&self, token_hash: &str) -> AppResult<()> {
        db::sessions::revoke(&self.pool, token_hash).await?;
        Ok(())
    }

    pub async fn validate(&self, principal: &SessionPrincipal) -> AppResult<ValidatedUser> {
        let user = self.profile(principal.user_id).await?;
        let subscription_plan = match principal.customer_id {
            Some(customer_id) => db::customers::subscription_plan(&self.pool, customer_id).await?,
            None => None,
        };
        Ok(ValidatedUser { user, subscription_plan })
    }

    pub async fn profile(&self, user_id: Uuid) -> AppResult<UserProfile> {
        let user = db::users::find_by_id(&self.pool, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        Ok(UserProfile::from(&user))
    }

    pub async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> AppResult<UserProfile> {
        let display_name = update
            .display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let phone_numbers = update.phone_numbers.map(|numbers| {
            numbers
                .into_iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect::<Vec<_>>()
        });

        let user =
            db::users::update_profile(&self.pool, user_id, display_name.as_deref(), phone_numbers.as_deref())
                .await?;
        Ok(UserProfile::from(&user))
    }

    pub async fn change_password(&self, user_id: Uuid, change: PasswordChange) -> AppResult<()> {
        let user = db::users::find_by_id(&self.pool, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if !auth::verify_password(change.current_password, user.password_hash).await? {
            return Err(AppError::bad_request("Current password is incorrect"));
        }
        validate_new_password(&change.new_password, &change.confirm_password)?;

        let hash = auth::hash_password(change.new_password).await?;
        db::users::update_password(&self.pool, user_id, &hash).await?;
        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    pub async fn set_avatar(&self, user_id: Uuid, content_type: Option<&str>, bytes: &[u8]) -> AppResult<UserProfile> {
        let stored = self.uploads.save(UploadKind::Avatar, content_type, bytes).await?;
        let url = stored
            .public_url
            .ok_or_else(|| anyhow::anyhow!("Avatar stored without a public URL"))?;

        let previous = match db::users::set_avatar(&self.pool, user_id, Some(&url)).await {
            Ok(previous) => previous,
            Err(e) => {
                self.uploads.remove(&stored.relative_path).await;
                return Err(e.into());
            }
        };
        self.remove_avatar_file(previous).await;
        self.profile(user_id).await
    }

    pub async fn remove_avatar(&self, user_id: Uuid) -> AppResult<UserProfile> {
        let previous = db::users::set_avatar(&self.pool, user_id, None).await?;
        self.remove_avatar_file(previous).await;
        self.profile(user_id).await
    }

    pub async fn email_registered(&self, email: &str) -> AppResult<bool> {
        let email = Email::parse(email)?;
        Ok(db::users::email_exists(&self.pool, &email).await?)
    }

    pub async fn wishlist(&self, customer_id: Uuid) -> AppResult<Vec<Book>> {
        Ok(db::customers::wishlist(&self.pool, customer_id).await?)
    }

    pub async fn add_to_wishlist(&self, customer_id: Uuid, book_id: Uuid) -> AppResult<Vec<Book>> {
        if db::books::find(&self.pool, book_id).await?.is_none() {
            return Err(AppError::not_found("Book not found"));
        }
        db::customers::add_to_wishlist(&self.pool, customer_id, book_id).await?;
        self.wishlist(customer_id).await
    }

    pub async fn remove_from_wishlist(&self, customer_id: Uuid, book_id: Uuid) -> AppResult<Vec<Book>> {
        if !db::customers::remove_from_wishlist(&self.pool, customer_id, book_id).await? {
            return Err(AppError::not_found("Book is not in the wishlist"));
        }
        self.wishlist(customer_id).await
    }

    /// Deactivating also ends every session the user holds.
    pub async fn set_active(&self, admin: &SessionPrincipal, user_id: Uuid, active: bool) -> AppResult<UserProfile> {
        if admin.user_id == user_id && !active {
            return Err(AppError::bad_request("Admins cannot deactivate themselves"));
        }
        if !db::users::set_active(&self.pool, user_id, active).await? {
            return Err(AppError::not_found("User not found"));
        }
        if !active {
            let revoked = db::sessions::revoke_all(&self.pool, user_id).await?;
            tracing::info!(user_id = %user_id, revoked, by = %admin.user_id, "User deactivated");
        } else {
            tracing::info!(user_id = %user_id, by = %admin.user_id, "User reactivated");
        }
        self.profile(user_id).await
    }

    pub async fn search_users(&self, search: UserSearch) -> AppResult<Page<UserProfile>> {
        let query = search_term(search.q.as_deref())?;
        let (limit, offset) = Paging { limit: search.limit, offset: search.offset }.resolve();
        let (users, total) = db::users::search(&self.pool, query, search.user_type, limit, offset).await?;
        Ok(Page {
            items: users.iter().map(UserProfile::from).collect(),
            total,
            limit,
            offset,
        })
    }

    pub async fn customers(&self, paging: Paging) -> AppResult<Page<CustomerSummary>> {
        let (limit, offset) = paging.resolve();
        let (items, total) = db::customers::list(&self.pool, limit, offset).await?;
        Ok(Page { items, total, limit, offset })
    }

    pub async fn customer(&self, customer_id: Uuid) -> AppResult<CustomerDetail> {
        let customer = db::customers::find(&self.pool, customer_id)
            .await?
            .ok_or_else(|| AppError::not_found("Customer not found"))?;
        let wishlist = db::customers::wishlist(&self.pool, customer_id).await?;
        let orders = db::orders::by_customer(&self.pool, customer_id).await?;
        Ok(CustomerDetail { customer, wishlist, orders })
    }

    pub async fn user_stats(&self) -> AppResult<Vec<RoleStats>> {
        Ok(db::users::role_stats(&self.pool).await?)
    }

    /// Seed the first admin from configuration. Returns false once any admin
    /// exists. An existing account with the seed email gains the admin role
    /// and keeps its password.
    pub async fn ensure_bootstrap_admin(&self, seed: &BootstrapAdmin) -> AppResult<bool> {
        if db::users::admin_exists(&self.pool).await? {
            return Ok(false);
        }
        let registration = bootstrap_registration(seed).validate()?;
        let profile = bootstrap_profile();

        let mut tx = self.pool.begin().await?;
        let user = match db::users::find_by_email(&mut *tx, &registration.email).await? {
            Some(existing) => {
                if !existing.has_role(AccountRole::Admin) {
                    db::users::add_role(&mut tx, existing.id, AccountRole::Admin).await?;
                }
                existing
            }
            None => self.insert_user(&mut tx, &registration, AccountRole::Admin).await?,
        };
        let admin_id = db::users::insert_admin(&mut tx, user.id, &profile).await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, admin_id = %admin_id, email = %user.email, "🛡️ Bootstrap admin created");
        Ok(true)
    }

    pub async fn purge_expired_sessions(&self) -> AppResult<u64> {
        Ok(db::sessions::purge_expired(&self.pool).await?)
    }

    async fn insert_user(
        &self,
        conn: &mut sqlx::PgConnection,
        registration: &ValidRegistration,
        role: AccountRole,
    ) -> AppResult<UserRecord> {
        let password_hash = auth::hash_password(registration.password.clone()).await?;
        let user = db::users::insert(
            conn,
            NewUser {
                username: &registration.username,
                email: &registration.email,
                password_hash: &password_hash,
                full_name: &registration.full_name,
                phone_numbers: &registration.phone_numbers,
                role,
            },
        )
        .await?;
        Ok(user)
    }

    async fn remove_avatar_file(&self, previous_url: Option<String>) {
        if let Some(relative) = previous_url.and_then(|url| self.uploads.relative_from_url(&url)) {
            self.uploads.remove(&relative).await;
        }
    }
}

fn search_term(q: Option<&str>) -> AppResult<&str> {
    match q.map(str::trim) {
        Some(term) if !term.is_empty() => Ok(term),
        _ => Err(AppError::bad_request("Search query is required")),
    }
}

fn bootstrap_registration(seed: &BootstrapAdmin) -> Registration {
    let username = seed.email.split('@').next().unwrap_or_default().trim().to_string();
    Registration {
        username,
        email: seed.email.clone(),
        password: seed.password.clone(),
        confirm_password: seed.password.clone(),
        full_name: "Administrator".to_string(),
        phone_numbers: Vec::new(),
    }
}

fn bootstrap_profile() -> AdminProfile {
    AdminProfile {
        admin_level: "super-admin".to_string(),
        permissions: ADMIN_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
        department: Some("technical".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::ANALYTICS_VIEW;

    #[test]
    fn test_paging_is_clamped() {
        assert_eq!(Paging::default().resolve(), (DEFAULT_PAGE_SIZE, 0));
        let paging = Paging { limit: Some(5000), offset: Some(-3) };
        assert_eq!(paging.resolve(), (MAX_PAGE_SIZE, 0));
        let paging = Paging { limit: Some(0), offset: Some(40) };
        assert_eq!(paging.resolve(), (1, 40));
    }

    #[test]
    fn test_search_term_required() {
        assert_eq!(search_term(Some("  tolkien ")).unwrap(), "tolkien");
        assert!(matches!(search_term(Some("   ")), Err(AppError::BadRequest(_))));
        assert!(matches!(search_term(None), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_user_search_accepts_user_type_alias() {
        let search: UserSearch = serde_json::from_value(serde_json::json!({
            "q": "ana",
            "userType": "publisher",
            "limit": 10
        }))
        .unwrap();
        assert_eq!(search.user_type, Some(AccountRole::Publisher));
        assert_eq!(search.limit, Some(10));
    }

    #[test]
    fn test_bootstrap_admin_holds_every_permission() {
        let seed = BootstrapAdmin {
            email: "Root@Books.example.com".to_string(),
            password: "change-me-now".to_string(),
        };
        let registration = bootstrap_registration(&seed).validate().unwrap();
        assert_eq!(registration.username, "Root");
        assert_eq!(registration.email.as_str(), "root@books.example.com");

        let profile = bootstrap_profile();
        assert_eq!(profile.admin_level, "super-admin");
        assert!(profile.permissions.iter().any(|p| p == USER_MANAGEMENT));
        assert!(profile.permissions.iter().any(|p| p == ANALYTICS_VIEW));
        assert_eq!(profile.permissions.len(), ADMIN_PERMISSIONS.len());
    }

    #[test]
    fn test_short_bootstrap_password_rejected() {
        let seed = BootstrapAdmin {
            email: "root@books.example.com".to_string(),
            password: "short".to_string(),
        };
        assert!(matches!(
            bootstrap_registration(&seed).validate(),
            Err(AccountError::WeakPassword(_))
        ));
    }
}
