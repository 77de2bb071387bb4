#[derive(sqlx::FromRow, Debug, Clone, serde::Serialize)]
pub struct User {
    pub id: i64,
    // email reported by spotify when the account exposes one,
    // otherwise a synthesized `{spotify_id}@spotify.user` placeholder.
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    // placeholder addresses are marked verified up front since there's
    // no real inbox to confirm against
    pub email_verified: bool,
    pub created: chrono::DateTime<chrono::Utc>,
    pub modified: chrono::DateTime<chrono::Utc>,
}

/// Fields required to create a new local identity for a
/// never-before-seen spotify account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
}

/// A stored spotify token pair, decrypted. One record per spotify
/// account, uniquely keyed by `spotify_id`.
#[derive(Debug, Clone)]
pub struct Credential {
    pub user_id: i64,
    pub spotify_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Replacement values for a credential record. Writes are
/// last-write-wins, keyed by `spotify_id`.
#[derive(Debug, Clone)]
pub struct CredentialUpsert {
    pub user_id: i64,
    pub spotify_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}
