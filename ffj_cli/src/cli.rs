//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use ffj_core::Stage;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "ffj", version, about = "AutoFFJ machine controller")]
pub struct Cli {
    /// Path to config TOML; a missing file means built-in defaults
    #[arg(long, value_name = "FILE", default_value = "etc/ffj_config.toml")]
    pub config: PathBuf,

    /// Print results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the button-driven control loop
    Run {
        /// Stop after this many polls (runs until Ctrl-C when omitted)
        #[arg(long, value_name = "N")]
        max_loops: Option<u64>,
        /// Treat the start button as pressed on the first poll (simulation only)
        #[arg(long, action = ArgAction::SetTrue)]
        press_start: bool,
    },
    /// Run every remaining stage now, without waiting for the start button
    Resume,
    /// Run a single stage if its predecessor is done
    Advance {
        /// Stage name, e.g. banana-added, molasses-added, mixed, sealed, fermenting
        stage: Stage,
    },
    /// Show recorded progress
    Status,
    /// Clear all progress (maintenance reset)
    Reset {
        /// Required; the reset cannot be undone
        #[arg(long, action = ArgAction::SetTrue)]
        yes: bool,
    },
    /// Home the sealer, mixer and slider without touching progress
    Home,
    /// Switch the camera on for a window, then off again
    Camera {
        /// Window length in seconds (config camera.window_s when omitted)
        #[arg(long, value_name = "SECS")]
        seconds: Option<u64>,
    },
    /// Print the current state of every limit switch
    Switches,
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
}
