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

pub mod aggregate;
pub mod auth;
pub mod collector;
pub mod models;
pub mod source;
pub mod store;

// Re-export key items for convenience
pub use aggregate::{CollectionSettings, LibraryAggregator};
pub use auth::{get_spotify_client, SpotifyAuth, SpotifyGateway};
pub use collector::{collect, CollectionRequest, Delay, PageResult, TokioDelay};
pub use models::{ListeningSnapshot, TimeRange};
pub use source::{FetchError, LibrarySource, SpotifySource};
pub use store::{
    persist_snapshot, MemoryStore, ProfileStore, SaveOutcome, SqliteStore, StoreError,
};
