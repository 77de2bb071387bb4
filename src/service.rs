use std::sync::Arc;

use tide::http::headers::HeaderValue;
use tide::security::{CorsMiddleware, Origin};

use crate::config::Config;
use crate::errors::Error;
use crate::identity::{IdentityProvider, PgIdentity};
use crate::models::User;
use crate::spotify::{Spotify, SpotifyApi};
use crate::store::{CredentialStore, PgStore};
use crate::{ops, resp, LOG};

const SPOTIFY_SCOPES: &str =
    "user-read-private user-read-email user-library-read playlist-modify-public playlist-modify-private";

#[derive(Clone)]
pub struct Context {
    pub config: Arc<Config>,
    pub spotify: Arc<dyn SpotifyApi>,
    pub identity: Arc<dyn IdentityProvider>,
    pub credentials: Arc<dyn CredentialStore>,
}

pub async fn start(config: Config, pool: sqlx::PgPool) -> crate::Result<()> {
    let host = config.host();
    let ctx = Context {
        spotify: Arc::new(Spotify::new(&config)),
        identity: Arc::new(PgIdentity::new(pool.clone(), &config)),
        credentials: Arc::new(PgStore::new(pool, &config)),
        config: Arc::new(config),
    };
    let mut app = tide::with_state(ctx);
    app.at("/").get(index);
    app.at("/status").get(status);
    app.at("/login").get(login);
    app.at("/auth/callback").get(auth_callback);
    app.at("/auth/complete").get(auth_complete);
    app.at("/tracks").get(saved_tracks);
    app.at("/playlists").post(create_playlist);
    app.with(tide::log::LogMiddleware::new());
    app.with(
        CorsMiddleware::new()
            .allow_origin(Origin::from("*"))
            .allow_methods(
                "GET, POST, OPTIONS"
                    .parse::<HeaderValue>()
                    .expect("invalid cors methods"),
            )
            .allow_headers(
                "authorization, x-client-info, apikey, content-type"
                    .parse::<HeaderValue>()
                    .expect("invalid cors headers"),
            ),
    );

    slog::info!(LOG, "running at {}", host);
    app.listen(host)
        .await
        .map_err(|e| Error::Internal(format!("server error {}", e)))?;
    Ok(())
}

async fn index(req: tide::Request<Context>) -> tide::Result {
    let resp: tide::Response = tide::Redirect::new(&req.state().config.app_url).into();
    Ok(resp)
}

#[derive(serde::Serialize)]
struct Status<'a> {
    ok: &'a str,
    version: &'a str,
}

async fn status(req: tide::Request<Context>) -> tide::Result {
    Ok(resp!(json => Status {
        ok: "ok",
        version: &req.state().config.version,
    }))
}

#[derive(serde::Serialize)]
struct LoginResponse {
    #[serde(rename = "authUrl")]
    auth_url: String,
}

fn authorize_url(config: &Config) -> String {
    format!(
        "{accounts}/authorize?response_type=code&client_id={id}&scope={scope}&redirect_uri={redirect}",
        accounts = config.spotify_accounts_url,
        id = urlencoding::encode(&config.spotify_client_id),
        scope = urlencoding::encode(SPOTIFY_SCOPES),
        redirect = urlencoding::encode(&config.spotify_redirect_url()),
    )
}

/// Hand the client the spotify authorize url to send the user to.
/// Spotify redirects back to `/auth/callback` once they approve.
async fn login(req: tide::Request<Context>) -> tide::Result {
    let auth_url = authorize_url(&req.state().config);
    Ok(resp!(json => LoginResponse { auth_url }))
}

#[derive(serde::Deserialize)]
struct CallbackParams {
    code: Option<String>,
}

/// Spotify sends users back here with a single-use `code` after they
/// approve access. Exchanging it resolves the local identity, persists
/// the token record, and 302s the browser on to its one-time login
/// link to establish a session.
async fn auth_callback(req: tide::Request<Context>) -> tide::Result {
    slog::info!(LOG, "got spotify auth callback");
    let ctx = req.state();
    let params: CallbackParams = match req.query() {
        Ok(params) => params,
        Err(e) => {
            slog::error!(LOG, "invalid callback query {:?}", e);
            return Ok(resp!(status => 400, message => "invalid query parameters"));
        }
    };
    let code = match params.code {
        Some(code) => code,
        None => {
            return Ok(Error::MissingInput("authorization code not found".into()).into_response())
        }
    };
    match ops::exchange_authorization(
        ctx.spotify.as_ref(),
        ctx.identity.as_ref(),
        ctx.credentials.as_ref(),
        &code,
    )
    .await
    {
        Ok(target) => Ok(tide::Redirect::new(target).into()),
        Err(e) => {
            slog::error!(LOG, "authorization exchange failed: {}", e);
            Ok(e.into_response())
        }
    }
}

#[derive(serde::Deserialize)]
struct CompleteParams {
    token: Option<String>,
}

/// Consume a one-time login token, set the session cookie, and land
/// the browser on the app.
async fn auth_complete(req: tide::Request<Context>) -> tide::Result {
    let ctx = req.state();
    let params: CompleteParams = match req.query() {
        Ok(params) => params,
        Err(e) => {
            slog::error!(LOG, "invalid complete query {:?}", e);
            return Ok(resp!(status => 400, message => "invalid query parameters"));
        }
    };
    let token = match params.token {
        Some(token) => token,
        None => return Ok(Error::MissingInput("login token not found".into()).into_response()),
    };
    let session = match ctx.identity.complete_login(&token).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            slog::info!(LOG, "rejected invalid or expired login token");
            return Ok(Error::Unauthenticated.into_response());
        }
        Err(e) => {
            slog::error!(LOG, "login completion failed: {}", e);
            return Ok(e.into_response());
        }
    };
    let mut resp: tide::Response = tide::Redirect::new(&ctx.config.app_url).into();
    resp.insert_header("set-cookie", session_cookie(&ctx.config, &session));
    Ok(resp)
}

fn session_cookie(config: &Config, token: &str) -> String {
    let mut cookie = format!(
        "auth_token={token}; Domain={domain}; HttpOnly; Max-Age={max_age}; SameSite=Lax",
        token = token,
        domain = config.domain(),
        max_age = config.auth_expiration_seconds,
    );
    if config.ssl {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Pull the session token off the request, preferring the bearer
/// header and falling back to the session cookie.
fn session_token(req: &tide::Request<Context>) -> Option<String> {
    if let Some(header) = req.header("authorization") {
        let value = header.last().as_str();
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    req.cookie("auth_token").map(|c| c.value().to_string())
}

async fn auth_user(req: &tide::Request<Context>) -> crate::Result<User> {
    let token = match session_token(req) {
        None => {
            slog::info!(LOG, "no session token on request");
            return Err(Error::Unauthenticated);
        }
        Some(token) => token,
    };
    req.state()
        .identity
        .user_by_session(&token)
        .await?
        .ok_or(Error::Unauthenticated)
}

/// The caller's saved-tracks library, flattened. First page only.
async fn saved_tracks(req: tide::Request<Context>) -> tide::Result {
    let user = match auth_user(&req).await {
        Ok(user) => user,
        Err(e) => return Ok(e.into_response()),
    };
    let ctx = req.state();
    match ops::saved_tracks(ctx.spotify.as_ref(), ctx.credentials.as_ref(), user.id).await {
        Ok(tracks) => Ok(resp!(json => tracks)),
        Err(e) => {
            slog::error!(LOG, "saved tracks fetch failed for user {}: {}", user.id, e);
            Ok(e.into_response())
        }
    }
}

#[derive(serde::Deserialize)]
struct CreatePlaylistRequest {
    #[serde(rename = "playlistName")]
    playlist_name: String,
    #[serde(rename = "trackUris", default)]
    track_uris: Vec<String>,
}

#[derive(serde::Serialize)]
struct CreatePlaylistResponse {
    #[serde(rename = "playlistUrl")]
    playlist_url: String,
}

async fn create_playlist(mut req: tide::Request<Context>) -> tide::Result {
    let body: CreatePlaylistRequest = match req.body_json().await {
        Ok(body) => body,
        Err(e) => {
            slog::error!(LOG, "invalid playlist request body {:?}", e);
            return Ok(resp!(status => 400, message => "invalid request body"));
        }
    };
    let user = match auth_user(&req).await {
        Ok(user) => user,
        Err(e) => return Ok(e.into_response()),
    };
    let ctx = req.state();
    match ops::transfer_playlist(
        ctx.spotify.as_ref(),
        ctx.credentials.as_ref(),
        user.id,
        &body.playlist_name,
        &body.track_uris,
    )
    .await
    {
        Ok(playlist_url) => Ok(resp!(json => CreatePlaylistResponse { playlist_url })),
        Err(e) => {
            slog::error!(LOG, "playlist transfer failed for user {}: {}", user.id, e);
            Ok(e.into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            version: "test".to_string(),
            ssl: false,
            host: "localhost".to_string(),
            real_hostname: None,
            port: 3030,
            app_url: "http://localhost:3000".to_string(),
            spotify_client_id: "client id".to_string(),
            spotify_client_secret: "secret".to_string(),
            spotify_accounts_url: "https://accounts.spotify.com".to_string(),
            spotify_api_url: "https://api.spotify.com/v1".to_string(),
            db_url: "postgres://localhost/test".to_string(),
            db_max_connections: 5,
            enc_key: "01234567890123456789012345678901".to_string(),
            login_token_expiration_seconds: 300,
            auth_expiration_seconds: 3600,
        }
    }

    #[test]
    fn authorize_url_percent_encodes_query_values() {
        let mut config = config();
        config.real_hostname = Some("https://api.example.com".to_string());
        let url = authorize_url(&config);
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapi.example.com%2Fauth%2Fcallback"));
        assert!(url.contains("scope=user-read-private%20user-read-email"));
        assert!(url.contains("client_id=client%20id"));
    }

    #[test]
    fn session_cookie_is_secure_only_over_ssl() {
        let plain = session_cookie(&config(), "tok");
        assert!(plain.contains("auth_token=tok"));
        assert!(plain.contains("Max-Age=3600"));
        assert!(!plain.contains("Secure"));

        let mut ssl_config = config();
        ssl_config.ssl = true;
        assert!(session_cookie(&ssl_config, "tok").contains("; Secure"));
    }
}
