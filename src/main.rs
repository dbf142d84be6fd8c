use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use plot_exporter::app::Config;
use plot_exporter::logwatch::{LogWatcher, ProgressMap};
use plot_exporter::metrics::MetricServer;
use plot_exporter::plotinfo::{plot_progress_from_path, PlotProgress};

/// Plot Exporter - export plotter log progress as metrics
#[derive(Parser)]
#[command(name = "plot-exporter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Config file (defaults to ~/.config/plot-exporter/config.toml)
    #[arg(short, long, env = "PLOT_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a log directory and export the progress of running plots
    Watch {
        /// Directory the plotter writes its logs to
        #[arg(short, long)]
        directory: Option<PathBuf>,
        /// Address for the metrics endpoint (e.g. 0.0.0.0:9808)
        #[arg(long)]
        listen: Option<String>,
        /// Don't serve metrics
        #[arg(long, conflicts_with = "listen")]
        no_metrics: bool,
        /// Seconds between directory scans
        #[arg(long)]
        scan_interval: Option<u64>,
        /// Seconds between console listings
        #[arg(long)]
        print_interval: Option<u64>,
        /// Don't print progress to stdout
        #[arg(long)]
        no_print: bool,
    },
    /// Print the progress of individual log files and exit
    Scan {
        /// Log files to read
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print JSON instead of `name: percent` lines
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    // Only the long-running watch writes a default config file
    let mut config = match cli.command {
        Commands::Watch { .. } => Config::load_from(&config_path)?,
        Commands::Scan { .. } => Config::read_from(&config_path)?,
    };
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    // ログ初期化
    init_logging(&config.log_level, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Watch {
            directory,
            listen,
            no_metrics,
            scan_interval,
            print_interval,
            no_print,
        } => {
            if let Some(directory) = directory {
                config.watch.directory = Some(directory);
            }
            if let Some(listen) = listen {
                config.metrics.enabled = true;
                config.metrics.listen_addr = listen;
            }
            if no_metrics {
                config.metrics.enabled = false;
            }
            if let Some(secs) = scan_interval {
                config.watch.scan_interval_secs = secs;
            }
            if let Some(secs) = print_interval {
                config.console.interval_secs = secs;
            }
            if no_print {
                config.console.enabled = false;
            }

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_watch(config))
        }
        Commands::Scan { files, json } => run_scan(&files, json),
    }
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::File::create(path)?;
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false))
                .init();
        }
        None => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    info!("Plot exporter starting");
    Ok(())
}

async fn run_watch(config: Config) -> Result<()> {
    let mut watcher = LogWatcher::new(config.watch_config()?);

    let server_handle = if config.metrics.enabled {
        let server = MetricServer::new(config.metrics.exposition());
        let listener = server.bind(&config.metrics.listen_addr).await?;
        watcher = watcher.with_sink(Arc::new(server));
        Some(tokio::spawn(async move {
            if let Err(e) = listener.serve().await {
                tracing::error!("Metrics endpoint error: {:#}", e);
            }
        }))
    } else {
        None
    };

    watcher.start()?;

    let mut print_ticker =
        tokio::time::interval(Duration::from_secs(config.console.interval_secs.max(1)));
    // The first tick fires immediately, before any scan has been published
    print_ticker.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                info!("Received {}, shutting down", signal);
                break;
            }
            _ = watcher.stopped() => break,
            _ = print_ticker.tick(), if config.console.enabled => {
                print_progress(&watcher.get_progress());
            }
        }
    }

    let result = watcher.shutdown().await;

    if let Some(handle) = server_handle {
        handle.abort();
    }

    result
}

/// Print `name: percent` for every running plot, sorted by name
fn print_progress(progress: &ProgressMap) {
    let mut entries: Vec<(&String, &u8)> = progress.iter().collect();
    entries.sort();
    for (name, percent) in entries {
        println!("{}: {}", name, percent);
    }
}

/// Wait for SIGINT, or SIGTERM on unix
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = wait_for_ctrl_c() => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[derive(Serialize)]
struct ScanReport {
    file: String,
    #[serde(flatten)]
    progress: PlotProgress,
}

fn run_scan(files: &[PathBuf], json: bool) -> Result<()> {
    let mut reports = Vec::new();
    let mut failed = 0;

    for path in files {
        match plot_progress_from_path(path) {
            Ok(progress) => reports.push(ScanReport {
                file: path.display().to_string(),
                progress,
            }),
            Err(e) => {
                eprintln!("Warning: {:#}", e);
                failed += 1;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            let suffix = if report.progress.completed {
                " (complete)"
            } else {
                ""
            };
            println!("{}: {}{}", report.file, report.progress.percent, suffix);
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} log files could not be read", failed, files.len());
    }
    Ok(())
}
