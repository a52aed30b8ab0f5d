use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use streamdex::{Pipeline, RawRecord, StreamdexConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "streamdex")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(long, env = "STREAMDEX_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,
    #[arg(long, env = "STREAMDEX_BIND_ADDR")]
    bind_addr: Option<String>,
    /// Start the consumption loop as soon as the server is up
    #[arg(long)]
    autostart: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Publish Debezium JSON records, one per line, onto the change log
    Ingest {
        /// Input file, or `-` for stdin
        input: String,
    },
}

/// Outcome of an ingest run.
#[derive(Debug, Default, PartialEq, Eq)]
struct IngestCounts {
    published: usize,
    filtered: usize,
}

fn ingest_lines(pipeline: &Pipeline, reader: impl BufRead) -> streamdex::Result<IngestCounts> {
    let mut counts = IngestCounts::default();

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: RawRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("[CDC] line {} is not a capture record: {}", n + 1, e);
                counts.filtered += 1;
                continue;
            }
        };
        match pipeline.publisher().publish(&record)? {
            Some(_) => counts.published += 1,
            None => counts.filtered += 1,
        }
    }

    Ok(counts)
}

fn run_ingest(config: StreamdexConfig, input: &str) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Pipeline::open(config)?;

    let counts = if input == "-" {
        ingest_lines(&pipeline, std::io::stdin().lock())?
    } else {
        let file = std::fs::File::open(Path::new(input))
            .map_err(|e| format!("cannot open {}: {}", input, e))?;
        ingest_lines(&pipeline, BufReader::new(file))?
    };

    println!("published={} filtered={}", counts.published, counts.filtered);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    std::fs::create_dir_all(&cli.data_dir)?;
    let mut config = StreamdexConfig::load_or_default(&cli.data_dir);
    if let Some(bind_addr) = cli.bind_addr {
        config.bind_addr = bind_addr;
    }

    match cli.command {
        Some(Command::Ingest { input }) => {
            tokio::task::spawn_blocking(move || run_ingest(config, &input).map_err(|e| e.to_string()))
                .await??;
            Ok(())
        }
        None => {
            let bind_addr = config.bind_addr.clone();
            let pipeline = Pipeline::open(config)?;
            if cli.autostart {
                let starter = std::sync::Arc::clone(&pipeline);
                let state = tokio::task::spawn_blocking(move || starter.indexer().start()).await??;
                tracing::info!("Indexer {}", state);
            }
            streamdex_http::serve(pipeline, &bind_addr).await
        }
    }
}
