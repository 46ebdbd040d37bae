use crate::collector::{collect, CollectionRequest, Delay, TokioDelay};
use crate::models::{ListeningSnapshot, TimeRange};
use crate::source::{FetchError, LibrarySource};
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// How much of each dataset to pull and how fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSettings {
    pub page_size: u32,
    pub target_count: u32,
    pub delay: Duration,
    pub artists_range: TimeRange,
    pub tracks_range: TimeRange,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            page_size: 50,
            target_count: 100,
            delay: Duration::from_secs(1),
            artists_range: TimeRange::Long,
            tracks_range: TimeRange::Short,
        }
    }
}

impl CollectionSettings {
    pub fn request(&self) -> CollectionRequest {
        CollectionRequest::new(self.page_size, self.target_count, self.delay)
    }
}

pub struct LibraryAggregator {
    source: Arc<dyn LibrarySource>,
    settings: CollectionSettings,
    delay: Arc<dyn Delay>,
}

impl LibraryAggregator {
    pub fn new(source: Arc<dyn LibrarySource>, settings: CollectionSettings) -> Self {
        Self::with_delay(source, settings, Arc::new(TokioDelay))
    }

    pub fn with_delay(
        source: Arc<dyn LibrarySource>,
        settings: CollectionSettings,
        delay: Arc<dyn Delay>,
    ) -> Self {
        Self {
            source,
            settings,
            delay,
        }
    }

    /// Fetches the profile and the three datasets one after another.
    ///
    /// The first failing call aborts the whole snapshot.
    pub async fn snapshot(&self) -> Result<ListeningSnapshot, FetchError> {
        let source = self.source.as_ref();
        let delay = self.delay.as_ref();
        let request = self.settings.request();

        let profile = source.profile().await?;

        let artists_range = self.settings.artists_range;
        info!("Getting top artists ({:?})", artists_range);
        let top_artists = collect(&request, delay, move |offset, limit| {
            source.top_artists(artists_range, offset, limit)
        })
        .await?;

        let tracks_range = self.settings.tracks_range;
        info!("Getting top tracks ({:?})", tracks_range);
        let top_tracks = collect(&request, delay, move |offset, limit| {
            source.top_tracks(tracks_range, offset, limit)
        })
        .await?;

        info!("Getting saved tracks");
        let saved_tracks = collect(&request, delay, move |offset, limit| {
            source.saved_tracks(offset, limit)
        })
        .await?;

        info!(
            "Collected {} artists, {} top tracks, {} saved tracks",
            top_artists.len(),
            top_tracks.len(),
            saved_tracks.len()
        );

        Ok(ListeningSnapshot {
            profile,
            top_artists,
            top_tracks,
            saved_tracks,
        })
    }
}
