use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dfembed_cli::{progress_bar, read_parquet};
use dfembed_core::config::{Config, IndexConfig};
use dfembed_embed::get_default_embedder;
use dfembed_pipeline::{analyze, Indexer};

#[derive(Parser, Debug)]
#[command(name = "dfembed", about = "Embed the rows of a Parquet file into a LanceDB table")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the columns, batch count and row count of a Parquet file
    Analyze {
        file: PathBuf,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Embed every row and append the vectors to the configured table
    Index(IndexArgs),
}

/// Overrides for the `[index]` config section.
#[derive(Args, Debug)]
struct IndexArgs {
    file: PathBuf,
    #[arg(long)]
    table_name: Option<String>,
    #[arg(long)]
    database_name: Option<String>,
    #[arg(long)]
    num_threads: Option<usize>,
    #[arg(long)]
    chunk_size: Option<usize>,
    #[arg(long)]
    write_buffer_size: Option<usize>,
    #[arg(long)]
    vector_dim: Option<usize>,
    /// Embed this column's value instead of the whole row
    #[arg(long)]
    text_column: Option<String>,
}

impl IndexArgs {
    fn apply(&self, cfg: &mut IndexConfig) {
        if let Some(v) = &self.table_name { cfg.table_name = v.clone(); }
        if let Some(v) = &self.database_name { cfg.database_name = v.clone(); }
        if let Some(v) = self.num_threads { cfg.num_threads = v; }
        if let Some(v) = self.chunk_size { cfg.embedding_chunk_size = v; }
        if let Some(v) = self.write_buffer_size { cfg.write_buffer_size = v; }
        if let Some(v) = self.vector_dim { cfg.vector_dim = v; }
        if self.text_column.is_some() { cfg.text_column = self.text_column.clone(); }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "dfembed=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze { file, json } => {
            let table = read_parquet(&file)?;
            let report = analyze(&table);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
        }
        Command::Index(args) => {
            let config = Config::load()?;
            let mut cfg = config.index_config()?;
            args.apply(&mut cfg);
            let table = read_parquet(&args.file)?;
            info!(file = %args.file.display(), rows = table.num_rows(), "loaded input");

            let embedder = Arc::from(get_default_embedder(cfg.vector_dim)?);
            let pb = progress_bar();
            let mut indexer = Indexer::new(cfg, embedder).with_progress(pb.clone());
            let summary = indexer.run(table).await?;
            pb.finish_and_clear();
            println!(
                "✅ Indexed {} rows into '{}' ({} batches)",
                summary.rows_written,
                indexer.config().table_name,
                summary.batches_committed
            );
        }
    }
    Ok(())
}
