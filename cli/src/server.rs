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

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use cookie::Cookie;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tastes_core::models::{ArtistRecord, SavedTrackRecord, TrackRecord, UserProfile};
use tastes_core::{
    persist_snapshot, CollectionSettings, Delay, LibraryAggregator, ProfileStore, SpotifyGateway,
};

pub const STATE_KEY: &str = "spotify_auth_state";
const STATE_LENGTH: usize = 16;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn SpotifyGateway>,
    pub store: Arc<dyn ProfileStore>,
    pub settings: CollectionSettings,
    pub delay: Arc<dyn Delay>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    access_token: Option<String>,
}

/// Body of `/dashboard`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardView {
    pub msg: String,
    pub user: UserProfile,
    pub top_artists: Vec<ArtistRecord>,
    pub top_tracks: Vec<TrackRecord>,
    pub liked_songs: Vec<SavedTrackRecord>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/dashboard", get(dashboard))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html("<a href=\"/login\">Log in with Spotify</a>")
}

fn state_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == STATE_KEY)
        .map(|cookie| cookie.value().to_string())
}

async fn login(State(state): State<AppState>) -> Response {
    let csrf_state = tastes_core::auth::generate_state(STATE_LENGTH);

    let url = match state.gateway.authorize_url(&csrf_state) {
        Ok(url) => url,
        Err(e) => {
            error!("Error building authorize URL: {}", e);
            return Redirect::to("/#error=invalid_client").into_response();
        }
    };

    let cookie = Cookie::build((STATE_KEY, csrf_state))
        .path("/")
        .http_only(true)
        .build();

    ([(header::SET_COOKIE, cookie.to_string())], Redirect::to(&url)).into_response()
}

async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let stored_state = state_cookie(&headers);

    let csrf_ok = matches!(
        (&params.state, &stored_state),
        (Some(received), Some(stored)) if received == stored
    );
    if !csrf_ok {
        return Redirect::to("/#error=state_mismatch").into_response();
    }

    let mut removal = Cookie::build((STATE_KEY, "")).path("/").build();
    removal.make_removal();
    let clear = [(header::SET_COOKIE, removal.to_string())];

    let Some(code) = params.code else {
        return (clear, Redirect::to("/#error=invalid_token")).into_response();
    };
    match state.gateway.exchange_code(&code).await {
        Ok(access_token) => {
            let query: String = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("access_token", &access_token)
                .finish();
            (clear, Redirect::to(&format!("/dashboard?{}", query))).into_response()
        }
        Err(e) => {
            error!("Error exchanging code: {}", e);
            (clear, Redirect::to("/#error=invalid_token")).into_response()
        }
    }
}

async fn dashboard(
    State(state): State<AppState>,
    Query(params): Query<DashboardParams>,
) -> Response {
    let Some(access_token) = params.access_token.filter(|t| !t.is_empty()) else {
        return Redirect::to("/login").into_response();
    };

    let aggregator = LibraryAggregator::with_delay(
        state.gateway.library(&access_token),
        state.settings,
        state.delay.clone(),
    );

    let snapshot = match aggregator.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Error fetching user data: {}", e);
            return Redirect::to("/login").into_response();
        }
    };

    let outcome = persist_snapshot(state.store.as_ref(), &snapshot).await;
    info!("Dashboard ready for {} ({})", snapshot.profile.id, outcome);

    Json(DashboardView {
        msg: outcome.message(),
        user: snapshot.profile,
        top_artists: snapshot.top_artists,
        top_tracks: snapshot.top_tracks,
        liked_songs: snapshot.saved_tracks,
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tastes_core::auth::AuthError;
    use tastes_core::{FetchError, LibrarySource, MemoryStore, PageResult, TimeRange};
    use tower::ServiceExt;

    struct FakeLibrary {
        fail: bool,
    }

    #[async_trait]
    impl LibrarySource for FakeLibrary {
        async fn profile(&self) -> Result<UserProfile, FetchError> {
            Ok(UserProfile {
                id: "listener".to_string(),
                display_name: None,
                email: Some("Listener@Example.com".to_string()),
                country: None,
                product: None,
                followers: 0,
                image_url: None,
                external_url: None,
            })
        }

        async fn top_artists(
            &self,
            _range: TimeRange,
            _offset: u32,
            _limit: u32,
        ) -> Result<PageResult<ArtistRecord>, FetchError> {
            let artist = ArtistRecord {
                id: "a1".to_string(),
                name: "Artist".to_string(),
                genres: vec![],
                popularity: 1,
                followers: 1,
                image_url: None,
                external_url: None,
            };
            Ok(PageResult::new(vec![artist], false))
        }

        async fn top_tracks(
            &self,
            _range: TimeRange,
            _offset: u32,
            _limit: u32,
        ) -> Result<PageResult<TrackRecord>, FetchError> {
            if self.fail {
                return Err(FetchError::Remote("401 Unauthorized".to_string()));
            }
            Ok(PageResult::new(vec![], false))
        }

        async fn saved_tracks(
            &self,
            _offset: u32,
            _limit: u32,
        ) -> Result<PageResult<SavedTrackRecord>, FetchError> {
            Ok(PageResult::new(vec![], false))
        }
    }

    struct FakeGateway {
        fail_library: bool,
    }

    #[async_trait]
    impl SpotifyGateway for FakeGateway {
        fn authorize_url(&self, state: &str) -> Result<String, AuthError> {
            Ok(format!("https://accounts.example/authorize?state={}", state))
        }

        async fn exchange_code(&self, code: &str) -> Result<String, AuthError> {
            if code == "good-code" {
                Ok("token/with+chars".to_string())
            } else {
                Err(AuthError::MissingToken)
            }
        }

        fn library(&self, _access_token: &str) -> Arc<dyn LibrarySource> {
            Arc::new(FakeLibrary {
                fail: self.fail_library,
            })
        }
    }

    fn app_with(fail_library: bool, store: Arc<MemoryStore>) -> Router {
        router(AppState {
            gateway: Arc::new(FakeGateway { fail_library }),
            store,
            settings: CollectionSettings {
                delay: Duration::ZERO,
                ..Default::default()
            },
            delay: Arc::new(tastes_core::TokioDelay),
        })
    }

    fn app() -> Router {
        app_with(false, Arc::new(MemoryStore::new()))
    }

    async fn get(app: Router, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        app.oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_sets_state_cookie_and_redirects() {
        let response = get(app(), "/login", None).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        let cookie = Cookie::parse(set_cookie.to_string()).unwrap();
        assert_eq!(cookie.name(), STATE_KEY);
        assert_eq!(cookie.value().len(), 16);
        assert_eq!(
            location(&response),
            format!("https://accounts.example/authorize?state={}", cookie.value())
        );
    }

    #[tokio::test]
    async fn test_callback_rejects_state_mismatch() {
        let response = get(
            app(),
            "/callback?code=good-code&state=abc",
            Some("spotify_auth_state=xyz"),
        )
        .await;
        assert_eq!(location(&response), "/#error=state_mismatch");

        let response = get(app(), "/callback?code=good-code&state=abc", None).await;
        assert_eq!(location(&response), "/#error=state_mismatch");
    }

    #[tokio::test]
    async fn test_callback_without_state_param_is_a_mismatch() {
        let response = get(
            app(),
            "/callback?code=good-code",
            Some("spotify_auth_state=abc"),
        )
        .await;

        assert_eq!(location(&response), "/#error=state_mismatch");
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_callback_without_code_clears_cookie() {
        let response = get(app(), "/callback?state=abc", Some("spotify_auth_state=abc")).await;

        assert_eq!(location(&response), "/#error=invalid_token");
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(set_cookie.starts_with("spotify_auth_state=;"));
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_callback_exchanges_code_and_clears_cookie() {
        let response = get(
            app(),
            "/callback?code=good-code&state=abc",
            Some("other=1; spotify_auth_state=abc"),
        )
        .await;

        assert_eq!(
            location(&response),
            "/dashboard?access_token=token%2Fwith%2Bchars"
        );
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(set_cookie.starts_with("spotify_auth_state=;"));
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_callback_failed_exchange() {
        let response = get(
            app(),
            "/callback?code=bad-code&state=abc",
            Some("spotify_auth_state=abc"),
        )
        .await;
        assert_eq!(location(&response), "/#error=invalid_token");
    }

    #[tokio::test]
    async fn test_dashboard_without_token_redirects_to_login() {
        let response = get(app(), "/dashboard", None).await;
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn test_dashboard_collects_and_saves_once() {
        let store = Arc::new(MemoryStore::new());

        let response = get(
            app_with(false, store.clone()),
            "/dashboard?access_token=t",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let view: DashboardView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.msg, "User data saved successfully");
        assert_eq!(view.top_artists.len(), 1);
        assert!(view.liked_songs.is_empty());
        assert!(store.load("listener@example.com").await.unwrap().is_some());

        let response = get(
            app_with(false, store.clone()),
            "/dashboard?access_token=t",
            None,
        )
        .await;
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let view: DashboardView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.msg, "data already saved");
    }

    #[tokio::test]
    async fn test_dashboard_fetch_failure_saves_nothing() {
        let store = Arc::new(MemoryStore::new());

        let response = get(
            app_with(true, store.clone()),
            "/dashboard?access_token=t",
            None,
        )
        .await;

        assert_eq!(location(&response), "/login");
        assert!(store.load("listener@example.com").await.unwrap().is_none());
    }
}
