/*
    spotify-tastes | Collects a listener's Spotify profile and top lists.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::source::{LibrarySource, SpotifySource};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::{distr::Alphanumeric, Rng};
use rspotify::{prelude::*, scopes, AuthCodeSpotify, Config, Credentials, OAuth, Token};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to initialize Spotify client: {0}")]
    ClientConfig(String),
    #[error("Spotify authentication failed: {0}")]
    Spotify(#[from] rspotify::ClientError),
    #[error("Spotify returned no access token")]
    MissingToken,
}

/// Scopes needed to read the profile (including email), top items and Liked Songs.
pub fn oauth_scopes() -> HashSet<String> {
    scopes!(
        "user-read-private",
        "user-read-email",
        "user-top-read",
        "user-library-read"
    )
}

/// Random alphanumeric value for the OAuth `state` parameter.
pub fn generate_state(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Builds a client around an access token obtained elsewhere.
///
/// The token is treated as valid for one hour and never refreshed.
pub fn client_from_access_token(access_token: &str) -> AuthCodeSpotify {
    let token = Token {
        access_token: access_token.to_string(),
        expires_in: Duration::hours(1),
        expires_at: Some(Utc::now() + Duration::hours(1)),
        refresh_token: None,
        ..Default::default()
    };
    AuthCodeSpotify::from_token(token)
}

/// What the web flow needs from Spotify.
#[async_trait]
pub trait SpotifyGateway: Send + Sync {
    /// URL the user is sent to, carrying `state` back to the callback.
    fn authorize_url(&self, state: &str) -> Result<String, AuthError>;

    /// Exchanges an authorization code for an access token.
    async fn exchange_code(&self, code: &str) -> Result<String, AuthError>;

    /// Library reads on behalf of the token's owner.
    fn library(&self, access_token: &str) -> Arc<dyn LibrarySource>;
}

/// Authorization Code Flow against the real Spotify accounts service.
#[derive(Debug, Clone)]
pub struct SpotifyAuth {
    credentials: Credentials,
    redirect_uri: String,
}

impl SpotifyAuth {
    pub fn new(credentials: Credentials, redirect_uri: impl Into<String>) -> Self {
        Self {
            credentials,
            redirect_uri: redirect_uri.into(),
        }
    }

    /// Reads `RSPOTIFY_CLIENT_ID`, `RSPOTIFY_CLIENT_SECRET` and `RSPOTIFY_REDIRECT_URI`.
    pub fn from_env() -> Result<Self, AuthError> {
        let credentials = Credentials::from_env().ok_or_else(|| {
            AuthError::ClientConfig(
                "Missing RSPOTIFY_CLIENT_ID or RSPOTIFY_CLIENT_SECRET".to_string(),
            )
        })?;
        let oauth = OAuth::from_env(oauth_scopes())
            .ok_or_else(|| AuthError::ClientConfig("Missing RSPOTIFY_REDIRECT_URI".to_string()))?;
        Ok(Self::new(credentials, oauth.redirect_uri))
    }

    fn client(&self, state: &str) -> AuthCodeSpotify {
        let oauth = OAuth {
            redirect_uri: self.redirect_uri.clone(),
            state: state.to_string(),
            scopes: oauth_scopes(),
            ..Default::default()
        };
        let config = Config {
            token_refreshing: false,
            ..Default::default()
        };
        AuthCodeSpotify::with_config(self.credentials.clone(), oauth, config)
    }
}

#[async_trait]
impl SpotifyGateway for SpotifyAuth {
    fn authorize_url(&self, state: &str) -> Result<String, AuthError> {
        Ok(self.client(state).get_authorize_url(false)?)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
        let spotify = self.client("");
        spotify.request_token(code).await?;

        let token = spotify
            .token
            .lock()
            .await
            .map_err(|_| AuthError::ClientConfig("Token lock poisoned".to_string()))?;
        token
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or(AuthError::MissingToken)
    }

    fn library(&self, access_token: &str) -> Arc<dyn LibrarySource> {
        Arc::new(SpotifySource::new(client_from_access_token(access_token)))
    }
}

/// Initializes and authenticates a Spotify client interactively in the terminal.
///
/// This function:
/// 1. Reads credentials (`RSPOTIFY_CLIENT_ID`, `RSPOTIFY_CLIENT_SECRET`) from the environment.
/// 2. Reads the redirect URI (`RSPOTIFY_REDIRECT_URI`) from the environment.
/// 3. Requests the read-only scopes from [`oauth_scopes`] (profile, email, top items, library).
/// 4. Runs the Authorization Code Flow once, without token caching or refreshing.
///
/// The user is asked (via stdout) to visit a URL and authorize the application.
pub async fn get_spotify_client() -> Result<AuthCodeSpotify, AuthError> {
    // Load credentials from env. `rspotify` expects RSPOTIFY_CLIENT_ID/SECRET.
    let creds = Credentials::from_env().ok_or_else(|| {
        AuthError::ClientConfig("Missing RSPOTIFY_CLIENT_ID or RSPOTIFY_CLIENT_SECRET".to_string())
    })?;

    // Load OAuth config (Redirect URI) from env.
    let oauth = OAuth::from_env(oauth_scopes())
        .ok_or_else(|| AuthError::ClientConfig("Missing RSPOTIFY_REDIRECT_URI".to_string()))?;

    // Every run logs in again: nothing is written to .spotify_token_cache.json
    // and the access token is never refreshed.
    let config = Config {
        token_cached: false,
        token_refreshing: false,
        ..Default::default()
    };

    let spotify = AuthCodeSpotify::with_config(creds, oauth, config);

    // Get the authorization URL.
    let url = spotify.get_authorize_url(false)?;

    // `prompt_for_token` comes from rspotify's `cli` feature:
    // 1. Tries to open the URL in the default browser.
    // 2. If that fails, prints the URL to stdout.
    // 3. Reads the URL the browser was redirected to and exchanges its code.
    spotify.prompt_for_token(&url).await?;

    Ok(spotify)
}
