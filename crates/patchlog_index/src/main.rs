use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_verbosity_flag::Verbosity;
use patchlog_core::config::Config;
use patchlog_index::{default_history_dir, publish, FileHistorySource, PatchStore};
use tracing_log::AsTrace;
use url::Url;

/// The `patchlog-index` CLI: generate and maintain a truncateable,
/// hash-chained patch log for a repodata document.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    verbose: Verbosity,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull new revisions from a local history directory, record any new
    /// patches, and regenerate the JLAP.
    Publish {
        /// Path to the SQLite patch store (created if it doesn't exist).
        #[arg(long, env = "PATCHLOG_STORE")]
        store: PathBuf,

        /// URL the patches are recorded under (also embedded in the JLAP's
        /// trailing metadata line).
        #[arg(long)]
        url: Url,

        /// Path to the current `repodata.json`. Its `.jlap` sibling is
        /// (re)written in place.
        #[arg(long)]
        repodata: PathBuf,

        /// Directory of `<revision>.json` snapshots to diff between.
        /// Defaults to `<repodata-stem>-history` next to `--repodata`.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Refuse to record a diff with more than this many RFC 6902
        /// operations.
        #[arg(long, default_value_t = Config::default().patch_steps_limit)]
        patch_steps_limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(cli.verbose.log_level_filter().as_trace())
        .init();

    match cli.command {
        Commands::Publish {
            store,
            url,
            repodata,
            history,
            patch_steps_limit,
        } => {
            let history_dir = history.unwrap_or_else(|| default_history_dir(&repodata));
            let store = PatchStore::open(&store)?;
            let source = FileHistorySource::new(history_dir);
            publish(&store, &source, url.as_str(), &repodata, patch_steps_limit).await?;
            Ok(())
        }
    }
}
