use async_trait::async_trait;

use crate::config::Config;
use crate::{Error, Result};

#[derive(serde::Deserialize, Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

#[derive(serde::Serialize)]
struct TokenGrantParams {
    grant_type: String,
    code: String,
    redirect_uri: String,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
pub struct Image {
    pub url: String,
}

/// The spotify account behind an access token.
#[derive(serde::Deserialize, Debug, Clone)]
pub struct Profile {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
pub struct Artist {
    pub name: String,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
pub struct Album {
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// A saved track, flattened out of spotify's `{items: [{track: ..}]}`
/// envelope. Never persisted, always sourced fresh from the api.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub uri: String,
    pub duration_ms: i64,
    pub artists: Vec<Artist>,
    pub album: Album,
}

#[derive(serde::Deserialize, Debug)]
struct SavedTracksPage {
    items: Vec<SavedTrackItem>,
}

#[derive(serde::Deserialize, Debug)]
struct SavedTrackItem {
    track: Track,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct ExternalUrls {
    pub spotify: String,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct CreatedPlaylist {
    pub id: String,
    pub external_urls: ExternalUrls,
}

pub const PLAYLIST_DESCRIPTION: &str =
    "Created with Blink's Spotify Liked Songs to Playlist app";

/// The fixed spotify wire contract the service depends on. A trait so
/// the operations can be exercised against a fake upstream.
#[async_trait]
pub trait SpotifyApi: Send + Sync {
    /// `POST /api/token`: trade an authorization code for a token pair.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant>;
    /// `GET /me`: the account profile behind an access token.
    async fn profile(&self, access_token: &str) -> Result<Profile>;
    /// `GET /me/tracks`: the first page of the saved-tracks library.
    async fn saved_tracks(&self, access_token: &str) -> Result<Vec<Track>>;
    /// `POST /users/{id}/playlists`: create a new non-public playlist.
    async fn create_playlist(
        &self,
        access_token: &str,
        spotify_user_id: &str,
        name: &str,
    ) -> Result<CreatedPlaylist>;
    /// `POST /playlists/{id}/tracks`: bulk-add tracks in one call.
    async fn add_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<()>;
}

/// Surf-backed client against the real spotify endpoints.
pub struct Spotify {
    client_id: String,
    client_secret: String,
    accounts_url: String,
    api_url: String,
    redirect_url: String,
}

impl Spotify {
    pub fn new(config: &Config) -> Self {
        Self {
            client_id: config.spotify_client_id.clone(),
            client_secret: config.spotify_client_secret.clone(),
            accounts_url: config.spotify_accounts_url.clone(),
            api_url: config.spotify_api_url.clone(),
            redirect_url: config.spotify_redirect_url(),
        }
    }

    fn basic_auth(&self) -> String {
        let auth = base64::encode(format!("{}:{}", self.client_id, self.client_secret).as_bytes());
        format!("Basic {}", auth)
    }
}

/// Read the response body for passing through as an error payload.
async fn error_body(resp: &mut surf::Response) -> String {
    resp.body_string()
        .await
        .unwrap_or_else(|e| format!("{{\"error\":\"unreadable upstream body: {}\"}}", e))
}

#[async_trait]
impl SpotifyApi for Spotify {
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let params = TokenGrantParams {
            grant_type: "authorization_code".to_string(),
            code: code.to_string(),
            redirect_uri: self.redirect_url.clone(),
        };
        let body = surf::Body::from_form(&params)
            .map_err(|e| Error::Internal(format!("form error {}", e)))?;
        let mut resp = surf::post(format!("{}/api/token", self.accounts_url))
            .body(body)
            .header("authorization", self.basic_auth())
            .send()
            .await
            .map_err(|e| Error::UpstreamAuth(format!("{{\"error\":\"{}\"}}", e)))?;
        if !resp.status().is_success() {
            return Err(Error::UpstreamAuth(error_body(&mut resp).await));
        }
        resp.body_json()
            .await
            .map_err(|e| Error::UpstreamAuth(format!("{{\"error\":\"token json parse error: {}\"}}", e)))
    }

    async fn profile(&self, access_token: &str) -> Result<Profile> {
        let mut resp = surf::get(format!("{}/me", self.api_url))
            .header("authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| Error::UpstreamFetch(format!("{{\"error\":\"{}\"}}", e)))?;
        if !resp.status().is_success() {
            return Err(Error::UpstreamFetch(error_body(&mut resp).await));
        }
        resp.body_json()
            .await
            .map_err(|e| Error::UpstreamFetch(format!("{{\"error\":\"profile json parse error: {}\"}}", e)))
    }

    async fn saved_tracks(&self, access_token: &str) -> Result<Vec<Track>> {
        // first page only, whatever page size spotify defaults to
        let mut resp = surf::get(format!("{}/me/tracks", self.api_url))
            .header("authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| Error::UpstreamFetch(format!("{{\"error\":\"{}\"}}", e)))?;
        if !resp.status().is_success() {
            return Err(Error::UpstreamFetch(error_body(&mut resp).await));
        }
        let page: SavedTracksPage = resp
            .body_json()
            .await
            .map_err(|e| Error::UpstreamFetch(format!("{{\"error\":\"tracks json parse error: {}\"}}", e)))?;
        Ok(page.items.into_iter().map(|item| item.track).collect())
    }

    async fn create_playlist(
        &self,
        access_token: &str,
        spotify_user_id: &str,
        name: &str,
    ) -> Result<CreatedPlaylist> {
        let body = serde_json::json!({
            "name": name,
            "description": PLAYLIST_DESCRIPTION,
            "public": false,
        });
        let mut resp = surf::post(format!("{}/users/{}/playlists", self.api_url, spotify_user_id))
            .header("authorization", format!("Bearer {}", access_token))
            .body(surf::Body::from_json(&body).map_err(|e| Error::Internal(format!("json body error {}", e)))?)
            .send()
            .await
            .map_err(|e| Error::UpstreamWrite(format!("{{\"error\":\"{}\"}}", e)))?;
        if !resp.status().is_success() {
            return Err(Error::UpstreamWrite(error_body(&mut resp).await));
        }
        resp.body_json()
            .await
            .map_err(|e| Error::UpstreamWrite(format!("{{\"error\":\"playlist json parse error: {}\"}}", e)))
    }

    async fn add_tracks(
        &self,
        access_token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<()> {
        let body = serde_json::json!({ "uris": uris });
        let mut resp = surf::post(format!("{}/playlists/{}/tracks", self.api_url, playlist_id))
            .header("authorization", format!("Bearer {}", access_token))
            .body(surf::Body::from_json(&body).map_err(|e| Error::Internal(format!("json body error {}", e)))?)
            .send()
            .await
            .map_err(|e| Error::UpstreamWrite(format!("{{\"error\":\"{}\"}}", e)))?;
        if !resp.status().is_success() {
            return Err(Error::UpstreamWrite(error_body(&mut resp).await));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_grant_parses_the_exchange_response() {
        let grant: TokenGrant = serde_json::from_str(
            r#"{"access_token":"T1","token_type":"Bearer","scope":"user-library-read","expires_in":3600,"refresh_token":"R1"}"#,
        )
        .unwrap();
        assert_eq!(grant.access_token, "T1");
        assert_eq!(grant.refresh_token.as_deref(), Some("R1"));
        assert_eq!(grant.expires_in, 3600);
    }

    #[test]
    fn profile_tolerates_missing_email_and_images() {
        let profile: Profile = serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
        assert_eq!(profile.id, "u1");
        assert!(profile.email.is_none());
        assert!(profile.images.is_empty());
    }

    #[test]
    fn saved_tracks_page_flattens_the_envelope() {
        let raw = r#"{
            "items": [
                {"track": {"id": "t1", "name": "One", "uri": "spotify:track:t1",
                           "duration_ms": 201000,
                           "artists": [{"name": "A"}, {"name": "B"}],
                           "album": {"name": "Alpha", "images": [{"url": "https://i/1"}]}}},
                {"track": {"id": "t2", "name": "Two", "uri": "spotify:track:t2",
                           "duration_ms": 95000,
                           "artists": [{"name": "C"}],
                           "album": {"name": "Beta", "images": []}}}
            ],
            "total": 2,
            "next": null
        }"#;
        let page: SavedTracksPage = serde_json::from_str(raw).unwrap();
        let tracks: Vec<Track> = page.items.into_iter().map(|i| i.track).collect();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, "t1");
        assert_eq!(tracks[0].artists[1].name, "B");
        assert_eq!(tracks[1].album.name, "Beta");
    }

    #[test]
    fn created_playlist_exposes_the_public_url() {
        let playlist: CreatedPlaylist = serde_json::from_str(
            r#"{"id":"pl1","external_urls":{"spotify":"https://open.spotify.com/playlist/pl1"}}"#,
        )
        .unwrap();
        assert_eq!(playlist.id, "pl1");
        assert_eq!(
            playlist.external_urls.spotify,
            "https://open.spotify.com/playlist/pl1"
        );
    }
}
