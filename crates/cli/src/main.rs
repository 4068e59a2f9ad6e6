//! Book reader CLI — open, navigate, and search a cached public-domain book
//! from the terminal. One process per invocation; state that needs to
//! survive between commands lives in the sparse cache directory on disk.

use std::path::{Path, PathBuf};

use bookreader_server::{init_logging, Library, ReaderConfig};
use clap::{Parser, Subcommand};

/// Network-efficient reader for public-domain plain-text books.
#[derive(Parser)]
#[command(name = "bookreader", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Mirror base URL to fetch books from (e.g. https://www.gutenberg.org/files)
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Local directory holding cached book images
    #[arg(long, global = true, default_value = ".bookreader-cache")]
    cache_dir: PathBuf,

    /// Path to a TOML config file overriding cache/navigator/searcher defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a book and show the first chunk of clean content
    Open {
        book_id: String,
        #[arg(long, default_value_t = 200)]
        chunk_words: usize,
    },
    /// Jump to a percent position (0-100) within a book
    Goto { book_id: String, percent: f64 },
    /// Search a book for a phrase
    Search {
        book_id: String,
        phrase: String,
        #[arg(long)]
        fuzzy: bool,
        #[arg(long)]
        max_matches: Option<usize>,
    },
    /// Inspect or manage the local sparse cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show aggregate cache hit/network byte counters
    Stats,
    /// Evict a book's cached image, forcing a re-fetch next time it's opened
    Invalidate { book_id: String },
}

fn load_config(path: &Option<PathBuf>, cache_dir: &Path) -> ReaderConfig {
    let mut config = match path {
        Some(p) => ReaderConfig::load(p).unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }),
        None => ReaderConfig::default(),
    };
    config.cache.cache_dir = cache_dir.to_path_buf();
    config
}

/// Build a `Library` backed by origin mirrors, for commands that may need
/// to fetch from the network (`open`, `goto`, `search`).
fn open_library(cli: &Cli, chunk_words: Option<usize>) -> Library {
    let origin = cli.origin.clone().unwrap_or_else(|| {
        eprintln!("Error: --origin <url> is required for this command");
        std::process::exit(1);
    });
    let mut config = load_config(&cli.config, &cli.cache_dir);
    if let Some(n) = chunk_words {
        config.navigator.chunk_words = n;
    }
    Library::open(vec![origin], |book_id| format!("/{book_id}"), config)
}

/// Build a `Library` with no mirrors, for commands that only touch the
/// local cache image (`cache stats`, `cache invalidate`).
fn local_library(cli: &Cli) -> Library {
    let config = load_config(&cli.config, &cli.cache_dir);
    Library::open(Vec::new(), |book_id| format!("/{book_id}"), config)
}

fn print_position(pos: &bookreader_reader::Position, json: bool) {
    if json {
        let value = serde_json::json!({
            "word_index": pos.word_index,
            "byte_start": pos.byte_start,
            "byte_end": pos.byte_end,
            "percent": pos.percent,
            "is_near_end": pos.is_near_end,
            "words": pos.words,
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap());
    } else {
        println!("[{:.1}%] bytes {}..{}", pos.percent, pos.byte_start, pos.byte_end);
        println!("{}", pos.words.join(" "));
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Open { book_id, chunk_words } => {
            let library = open_library(&cli, Some(*chunk_words));
            let mut navigator = library.open_navigator(book_id.clone()).unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(1);
            });
            let pos = navigator.go_to_percent(0.0).unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(1);
            });
            print_position(&pos, cli.json);
        }
        Commands::Goto { book_id, percent } => {
            let library = open_library(&cli, None);
            let mut navigator = library.open_navigator(book_id.clone()).unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(1);
            });
            let pos = navigator.go_to_percent(*percent).unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(1);
            });
            print_position(&pos, cli.json);
        }
        Commands::Search { book_id, phrase, fuzzy, max_matches } => {
            let library = open_library(&cli, None);
            let options =
                bookreader_reader::SearchOptions { fuzzy: *fuzzy, max_matches: *max_matches, ..Default::default() };
            let result = library.search(book_id, phrase, options).unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(1);
            });

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result).unwrap());
            } else if result.found {
                for m in &result.matches {
                    println!("byte {} (errors={}): {}", m.byte_offset, m.errors, m.context);
                }
                eprintln!(
                    "\n{} match(es), {} bytes downloaded, {} chunks, strategy={:?}",
                    result.matches.len(),
                    result.bytes_downloaded,
                    result.chunks_requested,
                    result.strategy
                );
            } else {
                eprintln!("No matches for '{phrase}'");
                std::process::exit(1);
            }
        }
        Commands::Cache { command } => match command {
            CacheCommands::Stats => {
                let library = local_library(&cli);
                let stats = library.cache_stats();
                if cli.json {
                    let value = serde_json::json!({
                        "requests": stats.requests,
                        "cache_hit_bytes": stats.cache_hit_bytes,
                        "network_bytes": stats.network_bytes,
                    });
                    println!("{}", serde_json::to_string_pretty(&value).unwrap());
                } else {
                    println!("requests:        {}", stats.requests);
                    println!("cache hit bytes: {}", stats.cache_hit_bytes);
                    println!("network bytes:   {}", stats.network_bytes);
                }
            }
            CacheCommands::Invalidate { book_id } => {
                let library = local_library(&cli);
                library.invalidate(book_id).unwrap_or_else(|e| {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                });
                eprintln!("invalidated {book_id}");
            }
        },
    }
}
