use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::config::Config;
use crate::models::{NewUser, User};
use crate::{crypto, Error, Result, LOG};

/// Identity boundary: resolves sessions to local users, creates users
/// for never-before-seen spotify accounts, and hands out one-time
/// login links (our stand-in for a hosted magic-link provider).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer/cookie session token to its user, if any.
    async fn user_by_session(&self, token: &str) -> Result<Option<User>>;
    async fn create_user(&self, new: &NewUser) -> Result<User>;
    /// Issue a one-time login token for the user and return the full
    /// redirect target that completes sign-in in the browser.
    async fn issue_login_token(&self, user_id: i64) -> Result<String>;
    /// Consume a one-time login token, returning a fresh session token
    /// when the login token was valid and unexpired.
    async fn complete_login(&self, token: &str) -> Result<Option<String>>;
}

fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Postgres-backed identity provider. Login and session tokens are
/// stored as hmac hashes so a table dump can't impersonate anyone.
pub struct PgIdentity {
    pool: PgPool,
    enc_key: String,
    redirect_host: String,
    login_token_seconds: i64,
    session_seconds: i64,
}

impl PgIdentity {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            pool,
            enc_key: config.enc_key.clone(),
            redirect_host: config.redirect_host(),
            login_token_seconds: config.login_token_expiration_seconds,
            session_seconds: config.auth_expiration_seconds,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LoginTokenRow {
    user_id: i64,
}

#[async_trait]
impl IdentityProvider for PgIdentity {
    async fn user_by_session(&self, token: &str) -> Result<Option<User>> {
        let hash = crypto::hmac_sign(token, &self.enc_key);
        let user = sqlx::query_as::<_, User>(
            "
            select u.*
            from users u
                inner join auth_tokens at
                on u.id = at.user_id
            where at.hash = $1 and at.expires > now()
            ",
        )
        .bind(&hash)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(ref u) = user {
            // clean out this user's expired sessions while we're here
            sqlx::query("delete from auth_tokens where user_id = $1 and expires <= now()")
                .bind(u.id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    slog::warn!(
                        LOG,
                        "error deleting expired auth tokens for user {}, continuing: {}",
                        u.id,
                        e
                    )
                })
                .ok();
        }
        Ok(user)
    }

    async fn create_user(&self, new: &NewUser) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            "
            insert into
            users (email, display_name, avatar_url, email_verified)
            values ($1, $2, $3, $4)
            returning *
            ",
        )
        .bind(&new.email)
        .bind(&new.display_name)
        .bind(&new.avatar_url)
        .bind(new.email_verified)
        .fetch_one(&self.pool)
        .await?;
        slog::info!(LOG, "created new user"; "user_id" => user.id, "email" => &user.email);
        Ok(user)
    }

    async fn issue_login_token(&self, user_id: i64) -> Result<String> {
        let token = new_token();
        let hash = crypto::hmac_sign(&token, &self.enc_key);
        let expires = Utc::now()
            .checked_add_signed(Duration::seconds(self.login_token_seconds))
            .ok_or_else(|| Error::Internal("error creating login token expiration".into()))?;
        sqlx::query(
            "
            insert into
            login_tokens (hash, user_id, expires)
            values ($1, $2, $3)
            ",
        )
        .bind(&hash)
        .bind(user_id)
        .bind(expires)
        .execute(&self.pool)
        .await?;
        slog::info!(LOG, "issued one-time login token"; "user_id" => user_id);
        Ok(format!(
            "{}/auth/complete?token={}",
            self.redirect_host, token
        ))
    }

    async fn complete_login(&self, token: &str) -> Result<Option<String>> {
        let hash = crypto::hmac_sign(token, &self.enc_key);
        let mut tr = self.pool.begin().await?;
        // deleting on consumption makes the token single use
        let row = sqlx::query_as::<_, LoginTokenRow>(
            "
            delete from login_tokens
            where hash = $1 and expires > now()
            returning user_id
            ",
        )
        .bind(&hash)
        .fetch_optional(&mut tr)
        .await?;
        let user_id = match row {
            None => return Ok(None),
            Some(row) => row.user_id,
        };
        let session = new_token();
        let session_hash = crypto::hmac_sign(&session, &self.enc_key);
        let expires = Utc::now()
            .checked_add_signed(Duration::seconds(self.session_seconds))
            .ok_or_else(|| Error::Internal("error creating session expiration".into()))?;
        sqlx::query(
            "
            insert into
            auth_tokens (hash, user_id, expires)
            values ($1, $2, $3)
            ",
        )
        .bind(&session_hash)
        .bind(user_id)
        .bind(expires)
        .execute(&mut tr)
        .await?;
        tr.commit().await?;
        slog::info!(LOG, "completed login"; "user_id" => user_id);
        Ok(Some(session))
    }
}
