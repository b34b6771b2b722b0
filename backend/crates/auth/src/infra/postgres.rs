//! PostgreSQL Repository Implementations

use chrono::{DateTime, Utc};
use platform::password::HashedPassword;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::{
    backup_code::BackupCode, linked_account::LinkedAccount,
    password_history::PasswordHistoryEntry, session::Session, user::User,
};
use crate::domain::repository::{
    BackupCodeRepository, LinkedAccountRepository, PasswordHistoryRepository, SessionRepository,
    UserRepository,
};
use crate::domain::value_object::{
    email::Email, two_factor::{TotpSecret, TwoFactorMethod}, user_id::UserId, user_role::UserRole,
};
use crate::error::{AuthError, AuthResult};

/// PostgreSQL-backed auth repository
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    email: String,
    name: Option<String>,
    password_hash: Option<String>,
    email_verified: bool,
    role: i16,
    two_factor_enabled: bool,
    two_factor_method: Option<String>,
    totp_secret: Option<String>,
    verification_token: Option<String>,
    verification_token_expires_at: Option<DateTime<Utc>>,
    reset_token: Option<String>,
    reset_token_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> AuthResult<User> {
        let password_hash = self
            .password_hash
            .map(HashedPassword::from_phc_string)
            .transpose()
            .map_err(|e| AuthError::Internal(format!("Corrupt password hash: {}", e)))?;

        let totp_secret = self.totp_secret.map(TotpSecret::from_base32).transpose()?;

        let two_factor_method = self
            .two_factor_method
            .as_deref()
            .and_then(TwoFactorMethod::from_str_opt);

        Ok(User {
            user_id: UserId::from_uuid(self.user_id),
            email: Email::from_db(self.email),
            name: self.name,
            password_hash,
            email_verified: self.email_verified,
            role: UserRole::from_id(self.role),
            two_factor_enabled: self.two_factor_enabled,
            two_factor_method,
            totp_secret,
            verification_token: self.verification_token,
            verification_token_expires_at: self.verification_token_expires_at,
            reset_token: self.reset_token,
            reset_token_expires_at: self.reset_token_expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const USER_COLUMNS: &str = r#"
    user_id,
    email,
    name,
    password_hash,
    email_verified,
    role,
    two_factor_enabled,
    two_factor_method,
    totp_secret,
    verification_token,
    verification_token_expires_at,
    reset_token,
    reset_token_expires_at,
    created_at,
    updated_at
"#;

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: Uuid,
    user_id: Uuid,
    persistent: bool,
    expires_at_ms: i64,
    created_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_session(self) -> Session {
        Session {
            session_id: self.session_id,
            user_id: UserId::from_uuid(self.user_id),
            persistent: self.persistent,
            expires_at_ms: self.expires_at_ms,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LinkedAccountRow {
    user_id: Uuid,
    provider: String,
    provider_id: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PasswordHistoryRow {
    user_id: Uuid,
    password_hash: String,
    created_at: DateTime<Utc>,
}

// ============================================================================
// User Repository Implementation
// ============================================================================

impl UserRepository for PgAuthRepository {
    async fn create_user(&self, user: &User) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                user_id,
                email,
                name,
                password_hash,
                email_verified,
                role,
                two_factor_enabled,
                two_factor_method,
                totp_secret,
                verification_token,
                verification_token_expires_at,
                reset_token,
                reset_token_expires_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(user.user_id.as_uuid())
        .bind(user.email.as_str())
        .bind(&user.name)
        .bind(user.password_hash.as_ref().map(|h| h.as_phc_string()))
        .bind(user.email_verified)
        .bind(user.role.id())
        .bind(user.two_factor_enabled)
        .bind(user.two_factor_method.map(|m| m.as_str()))
        .bind(user.totp_secret.as_ref().map(|s| s.as_base32()))
        .bind(&user.verification_token)
        .bind(user.verification_token_expires_at)
        .bind(&user.reset_token)
        .bind(user.reset_token_expires_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_user_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_user()).transpose()
    }

    async fn find_user_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_user()).transpose()
    }

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(exists.0)
    }

    async fn update_user(&self, user: &User) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET
                email = $2,
                name = $3,
                password_hash = $4,
                email_verified = $5,
                role = $6,
                two_factor_enabled = $7,
                two_factor_method = $8,
                totp_secret = $9,
                verification_token = $10,
                verification_token_expires_at = $11,
                reset_token = $12,
                reset_token_expires_at = $13,
                updated_at = $14
            WHERE user_id = $1
            "#,
        )
        .bind(user.user_id.as_uuid())
        .bind(user.email.as_str())
        .bind(&user.name)
        .bind(user.password_hash.as_ref().map(|h| h.as_phc_string()))
        .bind(user.email_verified)
        .bind(user.role.id())
        .bind(user.two_factor_enabled)
        .bind(user.two_factor_method.map(|m| m.as_str()))
        .bind(user.totp_secret.as_ref().map(|s| s.as_base32()))
        .bind(&user.verification_token)
        .bind(user.verification_token_expires_at)
        .bind(&user.reset_token)
        .bind(user.reset_token_expires_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Linked Account Repository Implementation
// ============================================================================

impl LinkedAccountRepository for PgAuthRepository {
    async fn create_link(&self, link: &LinkedAccount) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO linked_accounts (user_id, provider, provider_id, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(link.user_id.as_uuid())
        .bind(&link.provider)
        .bind(&link.provider_id)
        .bind(link.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_link(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> AuthResult<Option<LinkedAccount>> {
        let row = sqlx::query_as::<_, LinkedAccountRow>(
            r#"
            SELECT user_id, provider, provider_id, created_at
            FROM linked_accounts
            WHERE provider = $1 AND provider_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| LinkedAccount {
            user_id: UserId::from_uuid(r.user_id),
            provider: r.provider,
            provider_id: r.provider_id,
            created_at: r.created_at,
        }))
    }
}

// ============================================================================
// Password History Repository Implementation
// ============================================================================

impl PasswordHistoryRepository for PgAuthRepository {
    async fn append_history(&self, entry: &PasswordHistoryEntry) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO password_history (user_id, password_hash, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(entry.user_id.as_uuid())
        .bind(entry.password_hash.as_phc_string())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn history_for_user(&self, user_id: &UserId) -> AuthResult<Vec<PasswordHistoryEntry>> {
        let rows = sqlx::query_as::<_, PasswordHistoryRow>(
            r#"
            SELECT user_id, password_hash, created_at
            FROM password_history
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(PasswordHistoryEntry {
                    user_id: UserId::from_uuid(r.user_id),
                    password_hash: HashedPassword::from_phc_string(r.password_hash)
                        .map_err(|e| AuthError::Internal(format!("Corrupt history hash: {}", e)))?,
                    created_at: r.created_at,
                })
            })
            .collect()
    }
}

// ============================================================================
// Backup Code Repository Implementation
// ============================================================================

impl BackupCodeRepository for PgAuthRepository {
    async fn replace_backup_codes(
        &self,
        user_id: &UserId,
        codes: &[BackupCode],
    ) -> AuthResult<()> {
        // One transaction: readers see the old batch or the new one, never a
        // mix and never a steady-state empty set.
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM backup_codes WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        for code in codes {
            sqlx::query(
                r#"
                INSERT INTO backup_codes (user_id, code_hash, used, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(code.user_id.as_uuid())
            .bind(&code.code_hash)
            .bind(code.used)
            .bind(code.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn consume_backup_code(&self, user_id: &UserId, code_hash: &str) -> AuthResult<bool> {
        // Match and flip in one statement; two concurrent attempts cannot
        // both consume the same code.
        let updated = sqlx::query(
            r#"
            UPDATE backup_codes
            SET used = TRUE
            WHERE user_id = $1 AND code_hash = $2 AND used = FALSE
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(code_hash)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn delete_backup_codes(&self, user_id: &UserId) -> AuthResult<()> {
        sqlx::query("DELETE FROM backup_codes WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// ============================================================================
// Session Repository Implementation
// ============================================================================

impl SessionRepository for PgAuthRepository {
    async fn create_session(&self, session: &Session) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, persistent, expires_at_ms, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id.as_uuid())
        .bind(session.persistent)
        .bind(session.expires_at_ms)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> AuthResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, user_id, persistent, expires_at_ms, created_at
            FROM sessions
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_session()))
    }

    async fn delete_session(&self, session_id: Uuid) -> AuthResult<()> {
        sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_sessions_for_user(&self, user_id: &UserId) -> AuthResult<u64> {
        let deleted = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted)
    }

    async fn cleanup_expired_sessions(&self) -> AuthResult<u64> {
        let now_ms = Utc::now().timestamp_millis();

        let deleted = sqlx::query("DELETE FROM sessions WHERE expires_at_ms < $1")
            .bind(now_ms)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!(sessions_deleted = deleted, "Cleaned up expired sessions");

        Ok(deleted)
    }
}
