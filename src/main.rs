//! Merge service entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jwlibrary_merge::telemetry::{init_tracing, LogFormat};
use jwlibrary_merge::{merge_archives, merge_databases, server, MergeResult, ServiceConfig};

#[derive(Parser)]
#[command(name = "jwlibrary-merge", version, about = "Merge two JW Library backups")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP merge service
    Serve {
        /// Port to listen on (overrides PORT / MERGE_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Merge two backup archives into one
    Merge {
        /// First backup (.jwlibrary)
        first: PathBuf,
        /// Second backup (.jwlibrary)
        second: PathBuf,
        /// Working directory for extraction and output
        #[arg(long, env = "MERGE_WORK_DIR", default_value = "data")]
        work_dir: PathBuf,
    },
    /// Merge one userData.db into another in place
    MergeDb {
        /// Database whose rows are migrated
        source: PathBuf,
        /// Database that receives the rows
        destination: PathBuf,
    },
}

#[tokio::main]
async fn main() -> MergeResult<()> {
    let cli = Cli::parse();
    init_tracing(LogFormat::from_env())?;

    match cli.command {
        Command::Serve { port } => {
            let mut config = ServiceConfig::from_env()?;
            if let Some(port) = port {
                config.port = port;
            }
            server::serve(config).await
        }
        Command::Merge {
            first,
            second,
            work_dir,
        } => {
            std::fs::create_dir_all(&work_dir)?;
            let output = tokio::task::spawn_blocking(move || {
                merge_archives(&work_dir, &first, &second)
            })
            .await
            .map_err(|e| jwlibrary_merge::MergeError::Io(e.to_string()))??;
            println!("{}", output.archive.display());
            println!("{}", serde_json::to_string_pretty(&output.report)?);
            Ok(())
        }
        Command::MergeDb {
            source,
            destination,
        } => {
            let report = merge_databases(&source, &destination)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}
