use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use common::file_utils::{IMAGE_EXTENSIONS, files_with_extensions};
use lucent::config::{Config, DetailStrategy, Profile};
use lucent::governor::check_batch_size;
use lucent::session::{FsSessionStore, SessionId, SessionStore};
use lucent::{BatchProcessor, UploadedFile};

#[derive(Parser)]
#[command(name = "lucent")]
#[command(version, about = "Batch image enhancement and panorama stitching", long_about = None)]
struct Cli {
    /// Base log level (RUST_LOG overrides)
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a batch of images and print the report as JSON
    Process {
        /// Input files or directories
        #[arg(value_name = "INPUTS", required = true)]
        inputs: Vec<PathBuf>,

        /// Session store root directory
        #[arg(short, long, value_name = "DIR")]
        store: PathBuf,

        /// Configuration profile
        #[arg(long, value_enum, default_value_t = ProfileArg::Standard)]
        profile: ProfileArg,

        /// YAML or JSON configuration file (overrides --profile)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Detail enhancement strategy
        #[arg(long, value_enum)]
        detail: Option<DetailArg>,
    },

    /// Read one entry of a session back from the store
    Fetch {
        /// Session identifier printed by `process`
        session: String,

        /// Entry name, e.g. processed_tile.jpg or panorama.jpg
        name: String,

        /// Session store root directory
        #[arg(short, long, value_name = "DIR")]
        store: PathBuf,

        /// Output file
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileArg {
    Standard,
    Constrained,
}

impl From<ProfileArg> for Profile {
    fn from(value: ProfileArg) -> Self {
        match value {
            ProfileArg::Standard => Profile::Standard,
            ProfileArg::Constrained => Profile::Constrained,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DetailArg {
    Kernel,
    EdgeAware,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    common::log_setup::setup_logging(&cli.log_level);

    match cli.command {
        Commands::Process {
            inputs,
            store,
            profile,
            config,
            detail,
        } => {
            let mut config = match config {
                Some(path) => Config::load(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => Profile::from(profile).config(),
            };
            match detail {
                Some(DetailArg::Kernel) => config.pipeline.detail = DetailStrategy::KernelSharpen,
                Some(DetailArg::EdgeAware) => config.pipeline.detail = DetailStrategy::edge_aware(),
                None => {}
            }
            run_process(&inputs, store, config)
        }
        Commands::Fetch {
            session,
            name,
            store,
            out,
        } => run_fetch(&session, &name, store, &out),
    }
}

fn run_process(inputs: &[PathBuf], store: PathBuf, config: Config) -> anyhow::Result<()> {
    let paths = collect_inputs(inputs)?;
    check_batch_size(&config.governor, paths.len())?;
    let files = paths
        .iter()
        .map(|path| {
            UploadedFile::from_path(path)
                .with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    config
        .upload
        .validate(&files)
        .context("Upload rejected")?;

    let processor = BatchProcessor::new(config, FsSessionStore::new(store))?;
    let report = processor.process_batch(&files)?;
    println!("{}", report.to_json()?);
    Ok(())
}

/// Expands directories into their image files, keeping argument order.
fn collect_inputs(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let files = files_with_extensions(input, IMAGE_EXTENSIONS)
                .with_context(|| format!("Failed to list {}", input.display()))?;
            paths.extend(files);
        } else {
            paths.push(input.clone());
        }
    }
    if paths.is_empty() {
        bail!("No input images found");
    }
    Ok(paths)
}

fn run_fetch(session: &str, name: &str, store: PathBuf, out: &Path) -> anyhow::Result<()> {
    let store = FsSessionStore::new(store);
    let session = SessionId::from(session);
    let Some(bytes) = store.read(&session, name)? else {
        bail!("Session {session} has no entry '{name}'");
    };
    std::fs::write(out, &bytes).with_context(|| format!("Failed to write {}", out.display()))?;
    tracing::info!(
        session = %session,
        entry = name,
        bytes = bytes.len(),
        out = %out.display(),
        "Entry fetched"
    );
    Ok(())
}
