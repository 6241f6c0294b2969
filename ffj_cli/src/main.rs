mod cli;
mod commands;
mod error_fmt;
mod rig;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;
use ffj_config::Config;
use ffj_core::CancelToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
    }

    let mut log_guard = None;
    let code = match real_main(cli, &mut log_guard) {
        Ok(()) => 0,
        Err(e) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                println!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            tracing::error!(error = %format!("{e:#}"), "command failed");
            exit_code_for_error(&e)
        }
    };
    // exit() skips destructors; flush the file sink first
    drop(log_guard);
    std::process::exit(code);
}

fn real_main(cli: Cli, log_guard: &mut Option<WorkerGuard>) -> eyre::Result<()> {
    let (cfg, from_file) = load_config(&cli.config)?;
    *log_guard = init_tracing(&cli, &cfg);
    if from_file {
        tracing::debug!(path = %cli.config.display(), "config loaded");
    } else {
        tracing::info!(path = %cli.config.display(), "config file not found; using defaults");
    }

    let token = CancelToken::new();
    {
        let t = token.clone();
        if let Err(e) = ctrlc::set_handler(move || t.cancel()) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    let json = cli.json;
    match cli.cmd {
        Commands::Run {
            max_loops,
            press_start,
        } => commands::run(&cfg, token, max_loops, press_start, json),
        Commands::Resume => commands::resume(&cfg, token, json),
        Commands::Advance { stage } => commands::advance(&cfg, token, stage, json),
        Commands::Status => commands::status(&cfg, json),
        Commands::Reset { yes } => commands::reset(&cfg, yes, json),
        Commands::Home => commands::home(&cfg, token, json),
        Commands::Camera { seconds } => commands::camera(&cfg, token, seconds, json),
        Commands::Switches => commands::switches(&cfg, token, json),
        Commands::SelfCheck => commands::self_check(&cfg, token, json),
    }
}

/// Read and validate the config. A missing file yields the defaults; the
/// flag reports whether the file existed.
fn load_config(path: &Path) -> eyre::Result<(Config, bool)> {
    let (cfg, from_file) = match std::fs::read_to_string(path) {
        Ok(text) => {
            let cfg = ffj_config::load_toml(&text)
                .wrap_err_with(|| format!("parse config {}", path.display()))?;
            (cfg, true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Config::default(), false),
        Err(e) => {
            return Err(e).wrap_err_with(|| format!("read config {}", path.display()));
        }
    };
    cfg.validate().wrap_err("invalid configuration")?;
    Ok((cfg, from_file))
}

/// Console logs go to stderr so stdout stays clean for results. `RUST_LOG`
/// overrides `--log-level`. With `[logging] file` set, JSON lines are also
/// written there; the returned guard must live until exit.
fn init_tracing(cli: &Cli, cfg: &Config) -> Option<WorkerGuard> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let console = if cli.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };

    let mut guard = None;
    let file = cfg.logging.file.as_deref().map(|path| {
        let path = Path::new(path);
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "ffj.log".into(), |n| n.to_string_lossy().into_owned());
        let appender = match cfg.logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, g) = tracing_appender::non_blocking(appender);
        guard = Some(g);
        let level = cfg.logging.level.as_deref().unwrap_or("info");
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(EnvFilter::new(level))
    });

    if let Err(e) = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
    {
        eprintln!("logging already initialised: {e}");
    }
    guard
}
