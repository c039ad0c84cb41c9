use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{Days, Local, NaiveDate};
use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mediacat_core::backend::DeviceBackend;
use mediacat_core::date::parse_compact_date;
use mediacat_core::{
    copy_catalog, latest_captured_date, report_file_name, write_csv_report, CancellationToken, Catalog,
    CatalogConfig, CrawlEvent, Crawler, DateWindow, DefaultProbe, ListingCache, LocalBackend, MountedDevice,
    StorageBackend, StrategyKind, ThrottledProgress,
};

#[derive(Parser)]
#[command(name = "mediacat", version, about = "Catalog and copy media files by capture date")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl a tree and write a CSV report of the media found
    Catalog(CatalogArgs),
    /// Crawl a tree or an attached device and copy new media into month folders
    Copy(CopyArgs),
}

#[derive(Args)]
struct CrawlArgs {
    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to crawl
    #[arg(long)]
    root: Option<PathBuf>,

    /// Mount point of an attached device (MTP via gvfs/jmtpfs, camera card)
    #[arg(long)]
    device_mount: Option<PathBuf>,

    /// First capture date to include (yyyyMMdd)
    #[arg(long, value_parser = parse_date)]
    from: Option<NaiveDate>,

    /// Capture date to stop before (yyyyMMdd)
    #[arg(long, value_parser = parse_date)]
    to: Option<NaiveDate>,

    /// Skip paths containing this text (repeatable)
    #[arg(long)]
    ignore: Vec<String>,

    /// Only include this extension (repeatable)
    #[arg(long)]
    ext: Vec<String>,

    /// Duplicate handling
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,
}

#[derive(Args)]
struct CatalogArgs {
    #[command(flatten)]
    crawl: CrawlArgs,

    /// Report file name, `{}` is replaced by the date range
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(Args)]
struct CopyArgs {
    #[command(flatten)]
    crawl: CrawlArgs,

    /// Destination directory
    #[arg(long)]
    target: Option<PathBuf>,

    /// Reuse the listing saved by an earlier interrupted run
    #[arg(long)]
    use_cache: bool,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    parse_compact_date(s).ok_or_else(|| format!("invalid date {:?}, expected yyyyMMdd", s))
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Configuration file values with command-line flags applied on top.
fn resolve_config(args: &CrawlArgs) -> anyhow::Result<CatalogConfig> {
    let mut config = match &args.config {
        Some(path) => CatalogConfig::load(path)?,
        None => CatalogConfig::default(),
    };
    if let Some(root) = &args.root {
        config.search_directory = Some(root.clone());
    }
    if let Some(mount) = &args.device_mount {
        config.device_mount = Some(mount.clone());
    }
    if args.from.is_some() {
        config.start_date = args.from;
    }
    if args.to.is_some() {
        config.end_date = args.to;
    }
    if !args.ignore.is_empty() {
        config.ignore_names = args.ignore.clone();
    }
    if !args.ext.is_empty() {
        config.extensions = args.ext.clone();
    }
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    Ok(config)
}

/// The backend to crawl, with the identifier of its root.
fn open_backend(config: &CatalogConfig) -> anyhow::Result<(Box<dyn StorageBackend>, String)> {
    if let Some(mount) = &config.device_mount {
        let name = config.device_name.clone().unwrap_or_else(|| {
            mount
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "device".to_string())
        });
        let backend = DeviceBackend::new(MountedDevice::new(name, mount))?;
        return Ok((Box::new(backend), mount.to_string_lossy().into_owned()));
    }

    let root = config
        .search_directory
        .as_ref()
        .context("nothing to crawl: pass --root or --device-mount")?;
    let backend = LocalBackend::new(root)?;
    Ok((Box::new(backend), root.to_string_lossy().into_owned()))
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {msg}") {
        pb.set_style(style);
    }
    pb
}

fn crawl(
    backend: &dyn StorageBackend,
    root: &str,
    config: &CatalogConfig,
    window: DateWindow,
    cancel_token: &CancellationToken,
    quiet: bool,
) -> anyhow::Result<Catalog> {
    let spinner = if quiet { ProgressBar::hidden() } else { ProgressBar::new_spinner() };
    spinner.enable_steady_tick(Duration::from_millis(120));
    let observer = {
        let spinner = spinner.clone();
        move |event: &CrawlEvent| match event {
            CrawlEvent::DirectoryEntered { path } => spinner.set_message(path.clone()),
            CrawlEvent::PossibleDuplicate(dup) if !dup.retained => {
                spinner.println(format!("duplicate: {} (kept {})", dup.candidate, dup.kept));
            }
            _ => {}
        }
    };

    let catalog = Crawler::new(backend, config.filter())
        .with_strategy(config.strategy.build())
        .with_cancel_token(cancel_token.clone())
        .with_observer(&observer)
        .crawl(root, window);
    spinner.finish_and_clear();
    Ok(catalog?)
}

fn run_catalog(args: CatalogArgs, cancel_token: &CancellationToken, quiet: bool) -> anyhow::Result<()> {
    let mut config = resolve_config(&args.crawl)?;
    if let Some(output) = args.output {
        config.output_format = Some(output);
    }
    let window = config.window()?;
    let (backend, root) = open_backend(&config)?;

    let catalog = crawl(backend.as_ref(), &root, &config, window, cancel_token, quiet)?;

    let format = config.output_format.as_deref().unwrap_or("{}.csv");
    let report_path = report_file_name(format, window);
    let mut out = BufWriter::new(
        File::create(&report_path).with_context(|| format!("create report {}", report_path))?,
    );

    let pb = progress_bar(quiet);
    let callback = {
        let pb = pb.clone();
        move |stage: &str, current: u64, total: u64, message: &str| {
            pb.set_length(total);
            pb.set_position(current + 1);
            pb.set_message(format!("{}: {}", stage, message));
        }
    };
    let progress = ThrottledProgress::new(&callback);
    let rows = write_csv_report(&catalog, &DefaultProbe::default(), &mut out, &progress)?;
    pb.finish_and_clear();

    info!(report = %report_path, rows, duplicates = catalog.duplicate_total(), "report written");
    Ok(())
}

/// Default start date: the day of the newest file already copied. That day
/// is crawled again; files already in the target are skipped by the copier.
fn default_start(target: &Path) -> anyhow::Result<NaiveDate> {
    latest_captured_date(target)?.context("no start date given and the target holds no dated files")
}

fn run_copy(args: CopyArgs, cancel_token: &CancellationToken, quiet: bool) -> anyhow::Result<()> {
    let mut config = resolve_config(&args.crawl)?;
    if let Some(target) = args.target {
        config.target_directory = Some(target);
    }
    let target = config
        .target_directory
        .clone()
        .context("no target directory: pass --target")?;

    if config.start_date.is_none() {
        config.start_date = Some(default_start(&target)?);
    }
    if config.end_date.is_none() {
        config.end_date = Local::now().date_naive().checked_add_days(Days::new(1));
    }
    let window = config.window()?;

    let (backend, root) = open_backend(&config)?;
    let cache_path = ListingCache::path_for(&target, backend.name());

    let cached = if args.use_cache {
        ListingCache::load_in_range(&cache_path, window)?
    } else {
        None
    };
    let catalog = match cached {
        Some(catalog) => {
            info!(records = catalog.len(), "using cached listing");
            catalog
        }
        None => {
            let catalog = crawl(backend.as_ref(), &root, &config, window, cancel_token, quiet)?;
            std::fs::create_dir_all(&target)?;
            ListingCache::new(backend.name(), catalog.clone()).save(&cache_path)?;
            catalog
        }
    };

    let pb = progress_bar(quiet);
    let callback = {
        let pb = pb.clone();
        move |_stage: &str, current: u64, total: u64, message: &str| {
            pb.set_length(total);
            pb.set_position(current + 1);
            pb.set_message(message.to_string());
        }
    };
    let progress = ThrottledProgress::new(&callback);
    let result = copy_catalog(backend.as_ref(), &catalog, &target, &progress, Some(cancel_token))?;
    pb.finish_and_clear();

    if result.warnings.is_empty() {
        ListingCache::delete(&cache_path)?;
    } else {
        for line in &result.warnings {
            warn!("{}", line);
        }
        warn!(cache = %cache_path.display(), "listing kept for a --use-cache retry");
    }

    eprintln!(
        "Done! {} copied, {} already present, {} failed",
        result.copied,
        result.skipped,
        result.warnings.len()
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let t_total = Instant::now();

    let cancel_token = CancellationToken::new();
    {
        let token = cancel_token.clone();
        ctrlc::set_handler(move || token.cancel()).context("install Ctrl-C handler")?;
    }

    match cli.command {
        Command::Catalog(args) => run_catalog(args, &cancel_token, cli.quiet)?,
        Command::Copy(args) => run_copy(args, &cancel_token, cli.quiet)?,
    }

    info!(elapsed_secs = t_total.elapsed().as_secs_f64(), "finished");
    Ok(())
}
