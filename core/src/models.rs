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

use chrono::{DateTime, Utc};
use rspotify::{
    model::{FullArtist, FullTrack, Image, PrivateUser, SavedTrack},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Listening window for top artists and tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    /// Roughly the last four weeks.
    Short,
    /// Roughly the last six months.
    #[default]
    Medium,
    /// Several years of history.
    Long,
}

impl From<TimeRange> for rspotify::model::TimeRange {
    fn from(range: TimeRange) -> Self {
        match range {
            TimeRange::Short => rspotify::model::TimeRange::ShortTerm,
            TimeRange::Medium => rspotify::model::TimeRange::MediumTerm,
            TimeRange::Long => rspotify::model::TimeRange::LongTerm,
        }
    }
}

/// The account the snapshot belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub product: Option<String>, // "premium", "free", ...
    pub followers: u32,
    pub image_url: Option<String>,
    pub external_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRecord {
    pub id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub popularity: u32,
    pub followers: u32,
    pub image_url: Option<String>,
    pub external_url: Option<String>,
}

impl fmt::Display for ArtistRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.genres.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.genres.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: Option<String>, // Local files have no id
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub duration_ms: u32,
    pub popularity: u32,
    pub explicit: bool,
    pub preview_url: Option<String>,
    pub external_url: Option<String>,
}

impl fmt::Display for TrackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} (Album: {})",
            self.name,
            self.artists.join(", "),
            self.album
        )
    }
}

/// A "Liked Songs" entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTrackRecord {
    pub added_at: DateTime<Utc>,
    pub track: TrackRecord,
}

/// Everything gathered for one user in a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListeningSnapshot {
    pub profile: UserProfile,
    pub top_artists: Vec<ArtistRecord>,
    pub top_tracks: Vec<TrackRecord>,
    pub saved_tracks: Vec<SavedTrackRecord>,
}

impl ListeningSnapshot {
    /// Email used as the persistence key, trimmed and lower-cased.
    pub fn identity_key(&self) -> Option<String> {
        self.profile.email.as_deref().and_then(normalize_identity)
    }
}

/// Trims and lower-cases an email; blank input has no identity.
pub fn normalize_identity(email: &str) -> Option<String> {
    let key = email.trim().to_lowercase();
    (!key.is_empty()).then_some(key)
}

fn first_image(images: &[Image]) -> Option<String> {
    images.first().map(|image| image.url.clone())
}

fn spotify_url(urls: &HashMap<String, String>) -> Option<String> {
    urls.get("spotify").cloned()
}

// rspotify enums serialize to the provider's own codes ("US", "premium").
fn wire_label<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
}

impl From<PrivateUser> for UserProfile {
    fn from(user: PrivateUser) -> Self {
        Self {
            id: user.id.id().to_owned(),
            display_name: user.display_name,
            email: user.email,
            country: user.country.as_ref().and_then(wire_label),
            product: user.product.as_ref().and_then(wire_label),
            followers: user.followers.map(|f| f.total).unwrap_or_default(),
            image_url: user.images.as_deref().and_then(first_image),
            external_url: spotify_url(&user.external_urls),
        }
    }
}

impl From<FullArtist> for ArtistRecord {
    fn from(artist: FullArtist) -> Self {
        Self {
            id: artist.id.id().to_owned(),
            image_url: first_image(&artist.images),
            external_url: spotify_url(&artist.external_urls),
            name: artist.name,
            genres: artist.genres,
            popularity: artist.popularity,
            followers: artist.followers.total,
        }
    }
}

impl From<FullTrack> for TrackRecord {
    fn from(track: FullTrack) -> Self {
        Self {
            id: track.id.as_ref().map(|id| id.id().to_owned()),
            artists: track.artists.iter().map(|a| a.name.clone()).collect(),
            album: track.album.name,
            duration_ms: track.duration.num_milliseconds() as u32,
            popularity: track.popularity,
            explicit: track.explicit,
            external_url: spotify_url(&track.external_urls),
            preview_url: track.preview_url,
            name: track.name,
        }
    }
}

impl From<SavedTrack> for SavedTrackRecord {
    fn from(saved: SavedTrack) -> Self {
        Self {
            added_at: saved.added_at,
            track: saved.track.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn track(name: &str) -> TrackRecord {
        TrackRecord {
            id: Some("4iV5W9uYEdYUVa79Axb7Rh".to_string()),
            name: name.to_string(),
            artists: vec!["Artist One".to_string(), "Artist Two".to_string()],
            album: "Some Album".to_string(),
            duration_ms: 201_000,
            popularity: 60,
            explicit: false,
            preview_url: None,
            external_url: None,
        }
    }

    fn profile(email: Option<&str>) -> UserProfile {
        UserProfile {
            id: "wizzler".to_string(),
            display_name: Some("Wizzler".to_string()),
            email: email.map(str::to_string),
            country: Some("US".to_string()),
            product: Some("premium".to_string()),
            followers: 3,
            image_url: None,
            external_url: None,
        }
    }

    #[test]
    fn test_track_display() {
        let display = format!("{}", track("Song"));
        assert_eq!(display, "Song - Artist One, Artist Two (Album: Some Album)");
    }

    #[test]
    fn test_artist_display_with_and_without_genres() {
        let mut artist = ArtistRecord {
            id: "0OdUWJ0sBjDrqHygGUXeCF".to_string(),
            name: "Band of Horses".to_string(),
            genres: vec![],
            popularity: 59,
            followers: 10,
            image_url: None,
            external_url: None,
        };
        assert_eq!(format!("{}", artist), "Band of Horses");

        artist.genres = vec!["indie folk".to_string(), "rock".to_string()];
        assert_eq!(format!("{}", artist), "Band of Horses (indie folk, rock)");
    }

    #[test]
    fn test_identity_key_is_normalized() {
        let snapshot = ListeningSnapshot {
            profile: profile(Some("  Someone@Example.COM ")),
            top_artists: vec![],
            top_tracks: vec![],
            saved_tracks: vec![],
        };
        assert_eq!(
            snapshot.identity_key().as_deref(),
            Some("someone@example.com")
        );
    }

    #[test]
    fn test_identity_key_missing_or_blank() {
        let mut snapshot = ListeningSnapshot {
            profile: profile(None),
            top_artists: vec![],
            top_tracks: vec![],
            saved_tracks: vec![],
        };
        assert_eq!(snapshot.identity_key(), None);

        snapshot.profile.email = Some("   ".to_string());
        assert_eq!(snapshot.identity_key(), None);
    }

    #[test]
    fn test_time_range_maps_to_provider_terms() {
        assert_eq!(
            rspotify::model::TimeRange::from(TimeRange::Long),
            rspotify::model::TimeRange::LongTerm
        );
        assert_eq!(
            rspotify::model::TimeRange::from(TimeRange::Short),
            rspotify::model::TimeRange::ShortTerm
        );
    }

    #[test]
    fn test_artist_from_provider_payload() {
        let artist: FullArtist = serde_json::from_value(json!({
            "external_urls": { "spotify": "https://open.spotify.com/artist/0OdUWJ0sBjDrqHygGUXeCF" },
            "followers": { "href": null, "total": 306565 },
            "genres": ["indie folk", "indie pop"],
            "href": "https://api.spotify.com/v1/artists/0OdUWJ0sBjDrqHygGUXeCF",
            "id": "0OdUWJ0sBjDrqHygGUXeCF",
            "images": [
                { "height": 640, "url": "https://i.scdn.co/image/large", "width": 640 },
                { "height": 320, "url": "https://i.scdn.co/image/small", "width": 320 }
            ],
            "name": "Band of Horses",
            "popularity": 59,
            "type": "artist",
            "uri": "spotify:artist:0OdUWJ0sBjDrqHygGUXeCF"
        }))
        .unwrap();

        let record = ArtistRecord::from(artist);
        assert_eq!(record.id, "0OdUWJ0sBjDrqHygGUXeCF");
        assert_eq!(record.followers, 306565);
        assert_eq!(
            record.image_url.as_deref(),
            Some("https://i.scdn.co/image/large")
        );
        assert_eq!(
            record.external_url.as_deref(),
            Some("https://open.spotify.com/artist/0OdUWJ0sBjDrqHygGUXeCF")
        );
    }

    #[test]
    fn test_profile_from_provider_payload() {
        let user: PrivateUser = serde_json::from_value(json!({
            "country": "SE",
            "display_name": "JM Wizzler",
            "email": "email@example.com",
            "external_urls": { "spotify": "https://open.spotify.com/user/wizzler" },
            "followers": { "href": null, "total": 3829 },
            "href": "https://api.spotify.com/v1/users/wizzler",
            "id": "wizzler",
            "images": [],
            "product": "premium",
            "type": "user",
            "uri": "spotify:user:wizzler"
        }))
        .unwrap();

        let profile = UserProfile::from(user);
        assert_eq!(profile.id, "wizzler");
        assert_eq!(profile.country.as_deref(), Some("SE"));
        assert_eq!(profile.product.as_deref(), Some("premium"));
        assert_eq!(profile.followers, 3829);
        assert_eq!(profile.image_url, None);
    }
}
