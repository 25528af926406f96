mod cli;
mod display;
mod error_fmt;
mod rig;
mod scan;

use clap::Parser;
use cli::{Cli, Commands, DEFAULT_CONFIG, FILE_GUARD, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use scanrep_config::{Config, Logging};
use scanrep_core::PatientDescriptor;
use scanrep_core::error::ScanError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(err) = run(cli) {
        tracing::debug!("{err:?}");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    color_eyre::install()?;
    let loaded = load_config(cli.config.as_deref(), cli.legacy_config.as_deref())?;
    init_tracing(cli.json, &cli.log_level, &loaded.cfg.logging)?;
    tracing::debug!(
        source = ?loaded.source,
        legacy = ?cli.legacy_config,
        legacy_written = loaded.legacy_written,
        "config loaded"
    );
    let cfg = loaded.cfg;

    match cli.cmd {
        Commands::FirstScan {
            study,
            id,
            leg,
            scanner,
            foot,
            angle,
            interval,
        } => {
            let descriptor = PatientDescriptor {
                study,
                id,
                leg,
                scanner,
                foot,
                angle,
            };
            let shutdown = install_ctrlc();
            scan::first_scan(&cfg, cli.json, &descriptor, interval, &shutdown)
        }
        Commands::RepeatScan { label } => {
            let shutdown = install_ctrlc();
            scan::repeat_scan(&cfg, cli.json, &label, &shutdown)
        }
        Commands::Patients => scan::patients(&cfg, cli.json),
        Commands::Calibrate => scan::calibrate(&cfg, cli.json, &mut std::io::stdin().lock()),
        Commands::SelfCheck => scan::self_check(&cfg, cli.json),
    }
}

fn install_ctrlc() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Release)) {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler");
    }
    shutdown
}

struct LoadedConfig {
    cfg: Config,
    source: Option<PathBuf>,
    legacy_written: bool,
}

fn config_error(e: &eyre::Report) -> ScanError {
    ScanError::Config(format!("{e:#}"))
}

/// TOML first (explicit path, else the default path if present, else
/// built-in defaults), then the legacy CSV overlay, then validation.
fn load_config(path: Option<&Path>, legacy: Option<&Path>) -> eyre::Result<LoadedConfig> {
    let source = match path {
        Some(p) => Some(p.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG)).filter(|p| p.exists()),
    };
    let mut cfg = match &source {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .map_err(|e| ScanError::Config(format!("read {}: {e}", p.display())))?;
            scanrep_config::load_toml(&text)
                .map_err(|e| ScanError::Config(format!("parse {}: {e}", p.display())))?
        }
        None => Config::default(),
    };

    let mut legacy_written = false;
    if let Some(csv) = legacy {
        legacy_written =
            scanrep_config::write_default_legacy_csv(csv).map_err(|e| config_error(&e))?;
        let values = scanrep_config::load_legacy_csv(csv).map_err(|e| config_error(&e))?;
        cfg.apply_legacy(&values);
    }

    cfg.validate().map_err(|e| config_error(&e))?;
    Ok(LoadedConfig {
        cfg,
        source,
        legacy_written,
    })
}

fn init_tracing(json: bool, level: &str, logging: &Logging) -> eyre::Result<()> {
    use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| ScanError::Config(format!("log level {level:?}: {e}")))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(console_filter)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter)
                .boxed(),
        );
    }

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| ScanError::Config(format!("logging.file {file:?} has no file name")))?;
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_level = logging.level.as_deref().unwrap_or("info");
        let file_filter = EnvFilter::try_new(file_level)
            .map_err(|e| ScanError::Config(format!("logging.level {file_level:?}: {e}")))?;
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_explicit_config_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml")), None)
            .err()
            .unwrap();
        assert_eq!(exit_code_for_error(&err), 7);
    }

    #[test]
    fn legacy_csv_is_written_then_overlaid() {
        let dir = tempfile::tempdir().unwrap();
        let toml = dir.path().join("cfg.toml");
        fs::write(&toml, "[display]\nforce_error_margin = 0.5\n").unwrap();
        let csv = dir.path().join("config.csv");

        let loaded = load_config(Some(&toml), Some(&csv)).unwrap();
        assert!(loaded.legacy_written);
        assert!(csv.exists());
        // the fresh CSV carries defaults, which win over the TOML
        assert!((loaded.cfg.display.force_error_margin - 0.1).abs() < 1e-12);
        assert!((loaded.cfg.encoder.calibration - 1.8122e-05).abs() < 1e-15);

        fs::write(&csv, "force_error_margin,0.25\nencoder_calibration,-2e-5\n").unwrap();
        let loaded = load_config(Some(&toml), Some(&csv)).unwrap();
        assert!(!loaded.legacy_written);
        assert!((loaded.cfg.display.force_error_margin - 0.25).abs() < 1e-12);
        assert!((loaded.cfg.encoder.calibration - 2e-5).abs() < 1e-15);
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let toml = dir.path().join("cfg.toml");
        fs::write(&toml, "[display]\nrefresh_ms = 0\n").unwrap();
        let err = load_config(Some(&toml), None).err().unwrap();
        assert!(humanize(&err).contains("refresh_ms"));
    }
}
