//! `chatlog-index`: build and query the chat-archive full-text index.
//!
//! ```bash
//! # (Re)build from an NDJSON export, rebuilding only when the dataset changed
//! chatlog-index --config chatlog.toml ingest messages.ndjson
//!
//! chatlog-index --index target/demo/chatlog-index search "lunch" --talker alice,bob
//! chatlog-index --index target/demo/chatlog-index status
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use message_index::fingerprint::{fingerprint, DirectoryFileGroups};
use message_index::{IndexConfig, MessageIndex};
use message_model::{Message, SearchRequest, SearchResponse};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chatlog-index", version, about = "Full-text index over decrypted chat messages")]
struct Cli {
    /// Configuration file (TOML). Built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Index directory; overrides `path` from the configuration.
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index messages from an NDJSON file (`-` reads stdin).
    ///
    /// The index is reset first when the schema version or the dataset
    /// fingerprint no longer matches, or when `--rebuild` is given.
    Ingest {
        input: String,

        #[arg(long)]
        rebuild: bool,
    },

    /// Search indexed messages.
    Search {
        query: String,

        /// Comma-separated talker ids.
        #[arg(long, default_value = "")]
        talker: String,

        /// Comma-separated sender ids.
        #[arg(long, default_value = "")]
        sender: String,

        /// Inclusive lower bound (RFC 3339).
        #[arg(long, value_parser = parse_time)]
        start: Option<DateTime<Utc>>,

        /// Inclusive upper bound (RFC 3339).
        #[arg(long, value_parser = parse_time)]
        end: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 0)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show document count and index metadata.
    Status,

    /// Delete every document and all metadata.
    Reset,

    /// Print the current dataset fingerprint.
    Fingerprint,
}

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => IndexConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => IndexConfig::default(),
    };
    if let Some(index) = cli.index {
        config.path = index;
    }

    match cli.command {
        Commands::Ingest { input, rebuild } => ingest(&config, &input, rebuild),
        Commands::Search { query, talker, sender, start, end, limit, offset, json } => {
            let request = SearchRequest { query, talker, sender, start, end, limit, offset };
            search(&config, &request, json)
        }
        Commands::Status => {
            let idx = MessageIndex::with_config(&config)?;
            println!("{}", serde_json::to_string_pretty(&idx.status()?)?);
            Ok(())
        }
        Commands::Reset => {
            let idx = MessageIndex::with_config(&config)?;
            idx.reset()?;
            println!("index at {} reset", idx.path().display());
            Ok(())
        }
        Commands::Fingerprint => {
            println!("{}", dataset_fingerprint(&config)?);
            Ok(())
        }
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc)).map_err(|e| e.to_string())
}

fn dataset_fingerprint(config: &IndexConfig) -> Result<String> {
    if config.data_dir.is_none() {
        return Ok(String::new());
    }
    let source = DirectoryFileGroups::from_config(config)?;
    Ok(fingerprint(&source, &config.group_names()[..])?)
}

fn ingest(config: &IndexConfig, input: &str, rebuild: bool) -> Result<()> {
    let idx = MessageIndex::with_config(config)?;
    let fp = dataset_fingerprint(config)?;
    let version_ok = idx.ensure_version()?;
    let fingerprint_ok = fp.is_empty() || idx.fingerprint_matches(&fp)?;
    if rebuild || !version_ok || !fingerprint_ok {
        info!(version_ok, fingerprint_ok, forced = rebuild, "rebuilding index");
        idx.reset()?;
        idx.ensure_version()?;
    }

    let messages = read_messages(input)?;
    idx.index_messages(&messages)?;

    if !fp.is_empty() {
        idx.update_fingerprint(&fp)?;
    }
    idx.mark_built(Utc::now())?;
    info!(messages = messages.len(), docs = idx.doc_count()?, "ingest finished");
    Ok(())
}

fn read_messages(input: &str) -> Result<Vec<Message>> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(input).with_context(|| format!("open {input}"))?))
    };
    let mut messages = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read {input}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let msg: Message = serde_json::from_str(&line)
            .with_context(|| format!("{input}:{}: invalid message", n + 1))?;
        messages.push(msg);
    }
    if messages.is_empty() {
        warn!(input, "no messages read");
    }
    Ok(messages)
}

fn search(config: &IndexConfig, request: &SearchRequest, json: bool) -> Result<()> {
    let idx = MessageIndex::with_config(config)?;
    let mut response = idx.search_request(request)?;
    if json {
        response.index_status = Some(idx.status()?);
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    print_hits(&response);
    Ok(())
}

fn print_hits(response: &SearchResponse) {
    println!(
        "{} match(es), showing {}..{} ({} ms)",
        response.total,
        response.offset,
        response.offset + response.hits.len(),
        response.duration_ms
    );
    for hit in &response.hits {
        let m = &hit.message;
        let text =
            if hit.snippet.is_empty() { m.plain_text_content() } else { hit.snippet.clone() };
        println!(
            "[{:.3}] {} {}#{} {}: {}",
            hit.score,
            m.time.to_rfc3339(),
            m.talker,
            m.seq,
            m.sender,
            text
        );
    }
}
