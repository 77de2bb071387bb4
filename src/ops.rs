/*!
The three core operations: authorization exchange, saved-tracks fetch,
and playlist transfer. Everything here is written against the boundary
traits so the http layer stays a thin shell and tests can swap in fakes.

Each operation is a single-shot, strictly sequential chain of calls
with no retries. Failures surface immediately and nothing is rolled
back on a partial failure.
*/
use chrono::{Duration, Utc};

use crate::identity::IdentityProvider;
use crate::models::{CredentialUpsert, NewUser};
use crate::spotify::{SpotifyApi, Track};
use crate::store::CredentialStore;
use crate::{Error, Result, LOG};

/// Address synthesized for spotify accounts that don't expose an email.
pub fn placeholder_email(spotify_id: &str) -> String {
    format!("{}@spotify.user", spotify_id)
}

/// Trade an authorization code for tokens, resolve (or create) the
/// local identity behind the spotify account, persist the credential
/// record, and hand back the one-time login link the browser should be
/// redirected to.
pub async fn exchange_authorization(
    spotify: &dyn SpotifyApi,
    identity: &dyn IdentityProvider,
    credentials: &dyn CredentialStore,
    code: &str,
) -> Result<String> {
    let grant = spotify.exchange_code(code).await?;
    let refresh_token = grant
        .refresh_token
        .clone()
        .ok_or_else(|| Error::UpstreamAuth("{\"error\":\"missing refresh_token in token grant\"}".into()))?;
    let profile = spotify.profile(&grant.access_token).await?;

    let existing = credentials.find_by_spotify_id(&profile.id).await?;
    let user_id = match existing {
        // an account we've seen before keeps its user. The stored
        // display name and avatar are not refreshed here, only tokens.
        Some(cred) => {
            slog::info!(
                LOG, "re-authorization for known spotify account";
                "spotify_id" => &profile.id, "user_id" => cred.user_id,
            );
            cred.user_id
        }
        None => {
            let email = profile
                .email
                .clone()
                .unwrap_or_else(|| placeholder_email(&profile.id));
            let user = identity
                .create_user(&NewUser {
                    email,
                    display_name: profile.display_name.clone(),
                    avatar_url: profile.images.first().map(|i| i.url.clone()),
                    email_verified: true,
                })
                .await?;
            user.id
        }
    };

    let expires_at = Utc::now() + Duration::seconds(grant.expires_in as i64);
    credentials
        .upsert(&CredentialUpsert {
            user_id,
            spotify_id: profile.id.clone(),
            access_token: grant.access_token.clone(),
            refresh_token,
            expires_at,
        })
        .await?;

    identity.issue_login_token(user_id).await
}

/// The first page of the user's saved tracks, in upstream order.
pub async fn saved_tracks(
    spotify: &dyn SpotifyApi,
    credentials: &dyn CredentialStore,
    user_id: i64,
) -> Result<Vec<Track>> {
    let cred = credentials
        .find_by_user(user_id)
        .await?
        .ok_or(Error::CredentialNotFound)?;
    spotify.saved_tracks(&cred.access_token).await
}

/// Create a playlist named `name` on the user's spotify account and
/// bulk-add `uris` to it, returning the playlist's public url.
///
/// There is no cleanup on partial failure: if track insertion is
/// rejected after creation succeeded, the empty playlist remains.
pub async fn transfer_playlist(
    spotify: &dyn SpotifyApi,
    credentials: &dyn CredentialStore,
    user_id: i64,
    name: &str,
    uris: &[String],
) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::MissingInput("playlist name must not be empty".into()));
    }
    let cred = credentials
        .find_by_user(user_id)
        .await?
        .ok_or(Error::CredentialNotFound)?;
    let profile = spotify.profile(&cred.access_token).await?;
    let playlist = spotify
        .create_playlist(&cred.access_token, &profile.id, name)
        .await?;
    spotify
        .add_tracks(&cred.access_token, &playlist.id, uris)
        .await?;
    slog::info!(
        LOG, "transferred tracks to new playlist";
        "user_id" => user_id, "playlist_id" => &playlist.id, "tracks" => uris.len(),
    );
    Ok(playlist.external_urls.spotify)
}
