use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use env_logger::Builder;
use log::LevelFilter;
use serde::Serialize;
use songrec::catalog::search::DEFAULT_SEARCH_LIMIT;
use songrec::catalog::{search_songs, Catalog, Storage};
use songrec::config::Config;
use songrec::recommend::{
    AggregateDistanceRetriever, CosineRetriever, MalformedRowPolicy, Recommender,
};
use songrec::song::record::Record;
use songrec::song::{parse_rows, parse_songs, SongIdentity};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;

#[macro_use]
extern crate log;

#[derive(Parser)]
#[command(name = "songrec", about = "Recommend catalog songs from a playlist")]
struct Cli {
    /// Sled data directory, overrides SONGREC_STORAGE
    #[arg(long)]
    storage: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a JSON array of song records into the catalog
    Import {
        file: PathBuf,
        /// Load into this sub-collection instead of the catalog
        #[arg(long)]
        collection: Option<String>,
    },
    /// Search catalog songs by name and artist
    Search {
        song: String,
        #[arg(long)]
        artist: Option<String>,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Closest songs of a sub-collection to one catalog song
    Closest {
        name: String,
        artists: String,
        release_date: String,
        #[arg(long)]
        collection: Option<String>,
        /// fail or skip
        #[arg(long)]
        malformed_rows: Option<MalformedRowPolicy>,
    },
    /// Recommend catalog songs for a JSON playlist of feature records
    Playlist {
        file: PathBuf,
        #[arg(short, long)]
        n: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // read .env
    dotenv().ok();

    // init logger
    let log_level = std::env::var("RUST_LOG").unwrap_or_default();

    if log_level == "debug" {
        Builder::new()
            .filter(None, LevelFilter::Off)
            .filter(Some("songrec"), LevelFilter::Debug)
            .init();
    } else if log_level == "info" {
        Builder::new()
            .filter(None, LevelFilter::Off)
            .filter(Some("songrec"), LevelFilter::Info)
            .init();
    } else {
        env_logger::init();
    }

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(storage) = cli.storage {
        config.storage_dir = storage;
    }

    // the store lives for exactly one command
    let storage = Storage::open(&config.storage_dir)?;

    match cli.command {
        Command::Import { file, collection } => {
            let records = read_records(&file).await?;
            import(&storage, records, collection.as_deref()).await?;
        }
        Command::Search {
            song,
            artist,
            limit,
        } => {
            let songs = storage.songs().await?;
            let hits = search_songs(&songs, &song, artist.as_deref(), limit);
            print_json(&hits)?;
        }
        Command::Closest {
            name,
            artists,
            release_date,
            collection,
            malformed_rows,
        } => {
            let collection = collection.unwrap_or(config.collection);
            let retriever = AggregateDistanceRetriever::new(Arc::new(storage), collection)
                .with_policy(malformed_rows.unwrap_or(config.malformed_rows));
            let identity = SongIdentity::new(name, artists, release_date);
            let found = retriever.closest_to(&identity).await?;
            info!("closest to {}: {:?}", identity, found);
            print_json(&found)?;
        }
        Command::Playlist { file, n, seed } => {
            let playlist = read_records(&file).await?;
            let recommender =
                Recommender::new(Arc::new(CosineRetriever::new(Arc::new(storage))))
                    .with_seed(seed.unwrap_or(config.seed))
                    .with_max_iter(config.max_iter)
                    .with_concurrent(config.concurrent);
            let found = recommender
                .recommend(&playlist, n.unwrap_or(config.recommendations))
                .await?;
            print_json(&found)?;
        }
    }

    Ok(())
}

async fn import(storage: &Storage, records: Vec<Record>, collection: Option<&str>) -> Result<()> {
    match collection {
        Some(collection) => {
            let rows = parse_rows(&records)?;
            for row in rows.iter() {
                storage.insert_row(collection, row).await?;
            }
            info!("imported {} rows into {}", rows.len(), collection);
        }
        None => {
            let songs = parse_songs(&records)?;
            for song in songs.iter() {
                storage.insert_song(song).await?;
            }
            info!("imported {} songs", songs.len());
        }
    }
    Ok(())
}

async fn read_records(path: &PathBuf) -> Result<Vec<Record>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
