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

mod server;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use log::{info, warn};
use std::fs::File;
use std::io::Write;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tastes_core::{
    get_spotify_client, models::normalize_identity, persist_snapshot, CollectionSettings,
    LibraryAggregator, ListeningSnapshot, MemoryStore, ProfileStore, SpotifyAuth, SpotifySource,
    SqliteStore, TimeRange, TokioDelay,
};

#[derive(Parser)]
#[command(name = "spotify-tastes")]
#[command(about = "Collects your Spotify profile, top artists, top tracks and Liked Songs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the web login flow and serves the dashboard
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 8888)]
        port: u16,

        #[command(flatten)]
        collect: CollectArgs,
    },
    /// Logs in from the terminal and collects a single snapshot
    Snapshot {
        /// Output the snapshot to a JSON file (e.g., --json=snapshot.json)
        #[arg(long)]
        json: Option<String>,

        #[command(flatten)]
        collect: CollectArgs,
    },
    /// Prints the snapshot saved for an email address
    Show {
        /// Email address the snapshot was saved under
        #[arg(value_name = "EMAIL")]
        email: String,

        /// SQLite database holding saved snapshots
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

#[derive(Args, Clone)]
struct CollectArgs {
    /// SQLite database for saved snapshots (e.g., sqlite://tastes.db).
    /// `serve` keeps them in memory when unset; `snapshot` does not save them at all.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Items requested per page (Spotify allows at most 50)
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..=50))]
    page_size: u32,

    /// Items to collect per dataset before stopping
    #[arg(long, default_value_t = 100)]
    target_count: u32,

    /// Pause between page requests, in milliseconds
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,
}

impl CollectArgs {
    fn settings(&self) -> CollectionSettings {
        CollectionSettings {
            page_size: self.page_size,
            target_count: self.target_count,
            delay: Duration::from_millis(self.delay_ms),
            artists_range: TimeRange::Long,
            tracks_range: TimeRange::Short,
        }
    }

    /// Durable store, only when a database URL was given.
    async fn database(&self) -> anyhow::Result<Option<Arc<dyn ProfileStore>>> {
        match &self.database_url {
            Some(url) => {
                let store: Arc<dyn ProfileStore> = Arc::new(connect_database(url).await?);
                Ok(Some(store))
            }
            None => Ok(None),
        }
    }

    async fn store(&self) -> anyhow::Result<Arc<dyn ProfileStore>> {
        match self.database().await? {
            Some(store) => Ok(store),
            None => {
                warn!("No DATABASE_URL set, snapshots are kept in memory only");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }
}

async fn connect_database(url: &str) -> anyhow::Result<SqliteStore> {
    SqliteStore::connect(url)
        .await
        .with_context(|| format!("Error connecting to database {}", url))
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if dotenv().is_err() {
        // Silently ignore
    }

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Serve { port, collect } => handle_serve(*port, collect).await,
        Commands::Snapshot { json, collect } => handle_snapshot(json.as_deref(), collect).await,
        Commands::Show {
            email,
            database_url,
        } => handle_show(email, database_url).await,
    };

    if let Err(e) = result {
        eprintln!();
        eprintln!("[ERROR] {:#}", e);
        process::exit(1);
    }
}

async fn handle_serve(port: u16, args: &CollectArgs) -> anyhow::Result<()> {
    let gateway = SpotifyAuth::from_env()?;
    let state = server::AppState {
        gateway: Arc::new(gateway),
        store: args.store().await?,
        settings: args.settings(),
        delay: Arc::new(TokioDelay),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running at http://localhost:{}", port);

    axum::serve(listener, server::router(state)).await?;
    Ok(())
}

async fn handle_snapshot(json_path: Option<&str>, args: &CollectArgs) -> anyhow::Result<()> {
    let spotify = get_spotify_client()
        .await
        .context("Error initializing Spotify client")?;
    let store = args.database().await?;

    println!("Collecting your listening profile...");
    let aggregator = LibraryAggregator::new(Arc::new(SpotifySource::new(spotify)), args.settings());
    let snapshot = aggregator
        .snapshot()
        .await
        .context("Collection failed")?;

    print_summary(&snapshot);

    println!();
    match store {
        Some(store) => {
            let outcome = persist_snapshot(store.as_ref(), &snapshot).await;
            println!("[STORE] {}", outcome.message());
        }
        None => println!("[STORE] Not persisted (no --database-url / DATABASE_URL given)"),
    }

    if let Some(path) = json_path {
        let json_content = serde_json::to_string_pretty(&snapshot)?;
        let mut file =
            File::create(path).with_context(|| format!("Failed to create file '{}'", path))?;
        file.write_all(json_content.as_bytes())
            .context("Failed to write snapshot to file")?;
        println!();
        println!("[SAVED] Snapshot saved to: {}", path);
    }

    Ok(())
}

async fn handle_show(email: &str, database_url: &str) -> anyhow::Result<()> {
    let identity_key = normalize_identity(email)
        .with_context(|| format!("'{}' is not a usable email address", email))?;
    let store = connect_database(database_url).await?;

    match store.load(&identity_key).await? {
        Some(snapshot) => print_summary(&snapshot),
        None => println!("No snapshot saved for {}", identity_key),
    }
    Ok(())
}

fn print_summary(snapshot: &ListeningSnapshot) {
    let profile = &snapshot.profile;

    println!();
    println!("---------------------------------------------------");
    println!("LISTENING SNAPSHOT");
    println!("---------------------------------------------------");
    println!(
        "User:          {}",
        profile.display_name.as_deref().unwrap_or(&profile.id)
    );
    println!("Email:         {}", profile.email.as_deref().unwrap_or("-"));
    println!("Top Artists:   {}", snapshot.top_artists.len());
    println!("Top Tracks:    {}", snapshot.top_tracks.len());
    println!("Liked Songs:   {}", snapshot.saved_tracks.len());
    println!("---------------------------------------------------");

    if !snapshot.top_artists.is_empty() {
        println!();
        println!("Top artists (all time):");
        for (i, artist) in snapshot.top_artists.iter().take(5).enumerate() {
            println!("{}. {}", i + 1, artist);
        }
    }

    if !snapshot.top_tracks.is_empty() {
        println!();
        println!("Top tracks (last 4 weeks):");
        for (i, track) in snapshot.top_tracks.iter().take(5).enumerate() {
            println!("{}. {}", i + 1, track);
        }
    }
}
