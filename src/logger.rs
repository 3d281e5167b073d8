//! Logging sink used by the checkers, and the `tracing` subscriber set-up
//! that routes it to the console and to a per-capture log file.

use crate::types::{PtpMessage, format_capture_time};
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Narrative output of the checkers. Nothing a checker computes depends on
/// what the sink does with these calls.
pub trait Logger {
    fn info(&self, msg: &str);
    fn debug(&self, msg: &str);
    fn warning(&self, msg: &str);
    fn error(&self, msg: &str);

    /// Detail line locating `message` in the capture.
    fn msg_timing(&self, message: &PtpMessage, time_offset: Duration) {
        self.info(&format!(
            "    {} seq {} captured {} (+{:.6} s)",
            message.message_type(),
            message.sequence_id(),
            format_capture_time(message.capture_time),
            message.capture_offset(time_offset),
        ));
        if let Some(timestamp) = message.timestamp() {
            self.debug(&format!("      timestamp {}", timestamp));
        }
    }

    fn banner_small(&self, title: &str) {
        self.info(&format!("----- {} -----", title));
    }

    fn banner_large(&self, title: &str) {
        let rule = "=".repeat(title.len() + 8);
        self.info(&rule);
        self.info(&format!("    {}", title));
        self.info(&rule);
    }

    fn new_line(&self) {
        self.info("");
    }
}

/// Forwards every call to the `tracing` macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, msg: &str) {
        tracing::info!("{}", msg);
    }

    fn debug(&self, msg: &str) {
        tracing::debug!("{}", msg);
    }

    fn warning(&self, msg: &str) {
        tracing::warn!("{}", msg);
    }

    fn error(&self, msg: &str) {
        tracing::error!("{}", msg);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn info(&self, _msg: &str) {}
    fn debug(&self, _msg: &str) {}
    fn warning(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
    fn msg_timing(&self, _message: &PtpMessage, _time_offset: Duration) {}
    fn banner_small(&self, _title: &str) {}
    fn banner_large(&self, _title: &str) {}
    fn new_line(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogSeverity {
    Debug,
    Regular,
    WarningsAndErrors,
    ErrorsOnly,
    NoLogs,
    #[default]
    InfoOnly,
}

impl LogSeverity {
    pub fn allows(&self, level: &Level) -> bool {
        match self {
            LogSeverity::Debug => true,
            LogSeverity::Regular => *level <= Level::INFO,
            LogSeverity::WarningsAndErrors => *level <= Level::WARN,
            LogSeverity::ErrorsOnly => *level == Level::ERROR,
            LogSeverity::NoLogs => false,
            LogSeverity::InfoOnly => *level == Level::INFO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintOption {
    NoPrints,
    #[default]
    PrintToConsole,
}

#[derive(Debug, Clone, Default)]
pub struct LoggerOptions {
    pub severity: LogSeverity,
    pub print: PrintOption,
    /// Plain text log file; created (with its directory) on start-up.
    pub log_file: Option<PathBuf>,
}

/// Install the global subscriber described by `options`.
pub fn init_tracing(options: &LoggerOptions) -> Result<()> {
    let severity = options.severity;

    let console = match options.print {
        PrintOption::PrintToConsole => Some(fmt::layer().with_target(false).without_time()),
        PrintOption::NoPrints => None,
    };

    let file = match &options.log_file {
        Some(path) if severity != LogSeverity::NoLogs => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(filter_fn(move |metadata| severity.allows(metadata.level())))
        .with(console)
        .with(file)
        .try_init()
        .context("failed to install the log subscriber")?;

    Ok(())
}
