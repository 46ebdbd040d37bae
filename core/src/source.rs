use crate::collector::PageResult;
use crate::models::{ArtistRecord, SavedTrackRecord, TimeRange, TrackRecord, UserProfile};
use async_trait::async_trait;
use log::debug;
use rspotify::{model::Page, prelude::*, AuthCodeSpotify};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Spotify API error: {0}")]
    Spotify(#[from] rspotify::ClientError),
    #[error("Remote fetch failed: {0}")]
    Remote(String),
}

/// Read access to one user's library, one remote call per method.
#[async_trait]
pub trait LibrarySource: Send + Sync {
    async fn profile(&self) -> Result<UserProfile, FetchError>;

    async fn top_artists(
        &self,
        range: TimeRange,
        offset: u32,
        limit: u32,
    ) -> Result<PageResult<ArtistRecord>, FetchError>;

    async fn top_tracks(
        &self,
        range: TimeRange,
        offset: u32,
        limit: u32,
    ) -> Result<PageResult<TrackRecord>, FetchError>;

    async fn saved_tracks(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<PageResult<SavedTrackRecord>, FetchError>;
}

/// `LibrarySource` backed by an authenticated rspotify client.
pub struct SpotifySource {
    spotify: Arc<AuthCodeSpotify>,
}

impl SpotifySource {
    pub fn new(spotify: AuthCodeSpotify) -> Self {
        Self {
            spotify: Arc::new(spotify),
        }
    }
}

fn into_page_result<S, T: From<S>>(page: Page<S>) -> PageResult<T> {
    PageResult {
        has_next: page.next.is_some(),
        total: Some(page.total),
        items: page.items.into_iter().map(T::from).collect(),
    }
}

#[async_trait]
impl LibrarySource for SpotifySource {
    async fn profile(&self) -> Result<UserProfile, FetchError> {
        let user = self.spotify.me().await?;
        Ok(user.into())
    }

    async fn top_artists(
        &self,
        range: TimeRange,
        offset: u32,
        limit: u32,
    ) -> Result<PageResult<ArtistRecord>, FetchError> {
        debug!("GET top artists {:?} offset={} limit={}", range, offset, limit);
        let page = self
            .spotify
            .current_user_top_artists_manual(Some(range.into()), Some(limit), Some(offset))
            .await?;
        Ok(into_page_result(page))
    }

    async fn top_tracks(
        &self,
        range: TimeRange,
        offset: u32,
        limit: u32,
    ) -> Result<PageResult<TrackRecord>, FetchError> {
        debug!("GET top tracks {:?} offset={} limit={}", range, offset, limit);
        let page = self
            .spotify
            .current_user_top_tracks_manual(Some(range.into()), Some(limit), Some(offset))
            .await?;
        Ok(into_page_result(page))
    }

    async fn saved_tracks(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<PageResult<SavedTrackRecord>, FetchError> {
        debug!("GET saved tracks offset={} limit={}", offset, limit);
        let page = self
            .spotify
            .current_user_saved_tracks_manual(None, Some(limit), Some(offset))
            .await?;
        Ok(into_page_result(page))
    }
}
