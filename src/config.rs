use std::io::Read;
use std::fs;

use crate::{env_or, LOG};

/// Runtime configuration, built once at startup from the environment
/// and handed to the server state. Nothing outside of this module
/// reads environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub version: String,
    pub ssl: bool,
    pub host: String,
    pub real_hostname: Option<String>,
    pub port: u16,
    // where the browser app lives, used as the post-login landing page
    pub app_url: String,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_accounts_url: String,
    pub spotify_api_url: String,
    pub db_url: String,
    pub db_max_connections: u32,
    pub enc_key: String,
    pub login_token_expiration_seconds: i64,
    pub auth_expiration_seconds: i64,
}

impl Config {
    pub fn load() -> Self {
        let version = fs::File::open("commit_hash.txt")
            .map(|mut f| {
                let mut s = String::new();
                f.read_to_string(&mut s).expect("error reading commit_hash");
                s.trim().to_string()
            })
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            version,
            ssl: env_or("SSL", "false") == "true",
            host: env_or("HOST", "localhost"),
            real_hostname: std::env::var("REAL_HOSTNAME").ok(),
            port: env_or("PORT", "3030").parse().expect("invalid port"),
            app_url: env_or("APP_URL", "http://localhost:3000"),
            spotify_client_id: env_or("SPOTIFY_CLIENT_ID", "fake"),
            spotify_client_secret: env_or("SPOTIFY_CLIENT_SECRET", "fake"),
            spotify_accounts_url: env_or("SPOTIFY_ACCOUNTS_URL", "https://accounts.spotify.com"),
            spotify_api_url: env_or("SPOTIFY_API_URL", "https://api.spotify.com/v1"),
            db_url: env_or("DATABASE_URL", "error"),
            db_max_connections: env_or("DATABASE_MAX_CONNECTIONS", "5")
                .parse()
                .expect("invalid database_max_connections"),
            enc_key: env_or("ENC_KEY", "01234567890123456789012345678901"),
            login_token_expiration_seconds: env_or("LOGIN_TOKEN_EXPIRATION_SECONDS", "300")
                .parse()
                .expect("invalid login_token_expiration_seconds"),
            auth_expiration_seconds: env_or("AUTH_EXPIRATION_SECONDS", "2592000")
                .parse()
                .expect("invalid auth_expiration_seconds"),
        }
    }

    pub fn initialize(&self) -> anyhow::Result<()> {
        // aes-256-gcm and hmac-sha256 both want a 32 byte key
        anyhow::ensure!(
            self.enc_key.len() == 32,
            "ENC_KEY must be exactly 32 bytes, got {}",
            self.enc_key.len()
        );
        slog::info!(
            LOG, "initialized config";
            "version" => &self.version,
            "ssl" => &self.ssl,
            "host" => &self.host,
            "port" => &self.port,
            "app_url" => &self.app_url,
            "spotify_accounts_url" => &self.spotify_accounts_url,
            "spotify_api_url" => &self.spotify_api_url,
        );
        Ok(())
    }

    pub fn host(&self) -> String {
        let p = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", p, self.host, self.port)
    }

    /// The externally visible hostname, when deployed behind a proxy.
    pub fn redirect_host(&self) -> String {
        self.real_hostname.clone().unwrap_or_else(|| self.host())
    }

    /// Where spotify sends users back to after they approve access.
    pub fn spotify_redirect_url(&self) -> String {
        format!("{}/auth/callback", self.redirect_host())
    }

    pub fn domain(&self) -> String {
        self.host.clone()
    }
}
