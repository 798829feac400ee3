use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use convert_to_tarballs::config::{ConversionConfig, VERSIONS_FILE};
use convert_to_tarballs::convert::{
    Converter, ReleaseVersion, RunSummary, update_release_branch,
};
use convert_to_tarballs::locator::TarballLocator;

#[derive(Parser)]
#[command(name = "convert-to-tarballs")]
#[command(about = "Rewrite BuildStream elements to use the newest release tarballs")]
struct Cli {
    /// BuildStream project directory
    #[arg(short = 'd', long = "directory")]
    directory: PathBuf,

    /// Release being prepared, e.g. 3.30.1
    #[arg(short = 'v', long = "version")]
    version: ReleaseVersion,

    /// Overwrite an existing versions file
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// Conversion config, looked up next to the executable first
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Only update elements that already use tarballs
    #[arg(long = "no-convert")]
    no_convert: bool,

    #[arg(long = "output", default_value = VERSIONS_FILE)]
    output: PathBuf,

    /// Write logs to this file instead of stderr
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(log_file) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {:?}", dir))?;
    let file_name = log_file
        .file_name()
        .with_context(|| format!("Invalid log file {:?}", log_file))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

/// Config files are looked up next to the executable, then as given
fn resolve_config_path(requested: &Path) -> PathBuf {
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(requested)));
    match beside_exe {
        Some(path) if path.exists() => path,
        _ => requested.to_path_buf(),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_file.as_deref())?;

    let config_name = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(cli.version.default_config_name()));
    let config_path = resolve_config_path(&config_name);
    info!("Using config {:?}", config_path);
    let config = ConversionConfig::load(&config_path)?;

    if cli.output.exists() {
        if !cli.force {
            bail!(
                "Cannot proceed without --force as output file {:?} exists",
                cli.output
            );
        }
        std::fs::remove_file(&cli.output)
            .with_context(|| format!("Failed to remove {:?}", cli.output))?;
    }

    let summary = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(&cli, &config))?;

    if !cli.no_convert {
        let versions = summary.render_versions(&config)?;
        std::fs::write(&cli.output, versions)
            .with_context(|| format!("Failed to write {:?}", cli.output))?;
        if let Some(branch) = cli.version.flatpak_branch() {
            update_release_branch(&cli.directory, &branch)?;
        }
    }

    if !summary.ignored().is_empty() {
        warn!("{} modules were ignored", summary.ignored().len());
        println!("Could not update:");
        for module in summary.ignored() {
            println!("- {}", module);
        }
    }

    Ok(())
}

async fn run(cli: &Cli, config: &ConversionConfig) -> anyhow::Result<RunSummary> {
    let locator = TarballLocator::with_default_fetchers(config.mirrors.clone())?;
    let result = convert(cli, config, &locator).await;
    locator.close();
    result
}

async fn convert(
    cli: &Cli,
    config: &ConversionConfig,
    locator: &TarballLocator,
) -> anyhow::Result<RunSummary> {
    let mut converter = Converter::new(config, locator, &cli.directory, !cli.no_convert)?;
    converter.check_locations()?;
    converter.process_project(&cli.directory).await?;
    Ok(converter.into_summary())
}
