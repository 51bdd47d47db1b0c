//! CLI entry point for netdrive.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use netdrive_core::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use netdrive_core::{
    BatchEngine, BatchProgress, ClientOptions, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES,
    Dispatcher, DownloadSession, HttpClient, RetryPolicy, SessionKind, build_default_dispatcher,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod app_config;
mod cli;
mod progress;

use app_config::FileConfig;
use cli::Args;
use progress::FileProgress;

/// Effective run settings: CLI flags over config file over defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    output_dir: PathBuf,
    concurrency: usize,
    max_retries: u32,
    connect_timeout: Duration,
    read_timeout: Duration,
    rotate_user_agent: bool,
}

impl Settings {
    fn merge(args: &Args, file: &FileConfig) -> Self {
        let concurrency = args
            .concurrency
            .or(file.concurrency)
            .map_or(DEFAULT_CONCURRENCY, usize::from);
        let max_retries = args
            .max_retries
            .or(file.max_retries)
            .map_or(DEFAULT_MAX_RETRIES, u32::from);
        Self {
            output_dir: args
                .output
                .clone()
                .or_else(|| file.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            concurrency,
            max_retries,
            connect_timeout: Duration::from_secs(
                file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
            ),
            read_timeout: Duration::from_secs(file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS)),
            rotate_user_agent: file.rotate_user_agent.unwrap_or(true),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = app_config::load_default_config()?.unwrap_or_default();
    let settings = Settings::merge(&args, &file_config);
    debug!(?settings, "effective settings");

    let client = HttpClient::with_options(ClientOptions {
        connect_timeout: settings.connect_timeout,
        read_timeout: settings.read_timeout,
        retry: RetryPolicy::with_max_retries(settings.max_retries),
        rotate_user_agent: settings.rotate_user_agent,
    })
    .context("Failed to initialise HTTP client")?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let show_bar = !args.quiet && !args.resolve_only && !args.list;
    let progress = Arc::new(FileProgress::new(show_bar && stderr_is_terminal()));
    let engine = BatchEngine::new(client, settings.concurrency)?
        .with_progress(Arc::clone(&progress) as Arc<dyn BatchProgress>)
        .with_cancellation(cancel);
    let dispatcher = build_default_dispatcher(&engine);

    let outcome = if args.resolve_only {
        print_canonical(&dispatcher, &args.url).await
    } else if args.list {
        print_leaves(&dispatcher, &args.url).await
    } else {
        download(&dispatcher, progress.as_ref(), &args.url, &settings.output_dir).await
    };
    progress.finish();
    outcome
}

fn stderr_is_terminal() -> bool {
    use std::io::IsTerminal;
    std::io::stderr().is_terminal()
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling downloads");
            cancel.cancel();
        }
    });
}

async fn print_canonical(dispatcher: &Dispatcher, url: &str) -> Result<()> {
    let terminals = dispatcher.chain().resolve_all(url).await?;
    if terminals.is_empty() {
        bail!("No canonical URL reachable from {url}");
    }
    for canonical in terminals {
        println!("{canonical}");
    }
    Ok(())
}

async fn print_leaves(dispatcher: &Dispatcher, url: &str) -> Result<()> {
    let leaves = dispatcher.dispatch_and_flatten_all(url).await?;
    for leaf in &leaves {
        println!("{}\t{}\t{}", leaf.identity(), leaf.adapter_name(), leaf.url());
    }
    Ok(())
}

/// Number of sessions that download as a single transfer.
///
/// Directory and composite sessions announce their own batches.
fn standalone_count(sessions: &[DownloadSession]) -> usize {
    sessions
        .iter()
        .filter(|session| matches!(session.kind(), SessionKind::Standalone(_)))
        .count()
}

async fn download(
    dispatcher: &Dispatcher,
    progress: &dyn BatchProgress,
    url: &str,
    output_dir: &Path,
) -> Result<()> {
    let sessions = dispatcher.dispatch_all(url).await?;
    if sessions.is_empty() {
        bail!("Nothing to download from {url}");
    }
    info!(sessions = sessions.len(), output = %output_dir.display(), "starting downloads");
    progress.batch_started(standalone_count(&sessions));

    let mut failed = 0usize;
    let mut completed = 0usize;
    let mut bytes = 0u64;
    for session in &sessions {
        match session.download_to_directory(output_dir).await {
            Ok(summary) => {
                completed += summary.completed;
                bytes += summary.bytes;
                info!(identity = session.identity(), files = summary.completed, "session finished");
            }
            Err(err) => {
                failed += 1;
                error!(identity = session.identity(), error = %err, "session failed");
            }
        }
    }

    info!(completed, bytes, failed, "download complete");
    if failed > 0 {
        bail!("{failed} of {} download session(s) failed", sessions.len());
    }
    Ok(())
}
