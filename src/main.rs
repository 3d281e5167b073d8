use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Instant;

mod analyser;
mod announce;
mod config;
mod exchange;
mod logger;
mod ports;
mod sequence;
mod source;
mod stats;
mod stream;
#[cfg(test)]
mod testutil;
mod timing;
mod types;

use analyser::Check;
use config::AnalysisConfig;
use logger::{LogSeverity, LoggerOptions, PrintOption, TracingLogger};
use stream::ClassifiedStream;

fn parse_rate_error(s: &str) -> Result<f64, String> {
    config::parse_percentage(s).map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "ptp-check")]
#[command(about = "Protocol health checks for PTP traffic captured in a pcap or pcapng file")]
#[command(version)]
pub struct Cli {
    /// Capture file to analyse (pcap or pcapng)
    #[arg(value_name = "FILE")]
    capture: PathBuf,

    /// Log info, warnings and errors
    #[arg(short, long)]
    verbose: bool,

    /// Log everything, including debug details
    #[arg(short, long)]
    debug: bool,

    /// Log warnings and errors only
    #[arg(short, long)]
    warnings: bool,

    /// Log errors only
    #[arg(short, long)]
    errors_only: bool,

    /// Do not log at all
    #[arg(short = 'l', long)]
    no_logs: bool,

    /// Do not print to the console; write the log file only
    #[arg(short = 'p', long)]
    no_prints: bool,

    /// Directory for the per-capture log file
    #[arg(long, value_name = "DIR", default_value = "reports")]
    log_dir: PathBuf,

    /// JSON configuration file with "allowed_relative_ptp_rate_error"
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Allowed relative rate error, e.g. "2%". Overrides the configuration file
    #[arg(long, value_name = "PERCENT", value_parser = parse_rate_error)]
    rate_error: Option<f64>,

    /// Run every check (default when no check is selected)
    #[arg(long)]
    full: bool,

    /// Check Announce message consistency
    #[arg(long)]
    announce: bool,

    /// Check MAC address and clock identity stability
    #[arg(long)]
    ports: bool,

    /// Check sequence id continuity
    #[arg(long = "sequence-id", alias = "sequenceId")]
    sequence_id: bool,

    /// Check message rate and timing regularity
    #[arg(long)]
    timing: bool,

    /// Match Sync / DelayReq / DelayResp exchanges
    #[arg(long = "match")]
    matching: bool,
}

impl Cli {
    fn severity(&self) -> LogSeverity {
        if self.no_logs {
            LogSeverity::NoLogs
        } else if self.debug {
            LogSeverity::Debug
        } else if self.verbose {
            LogSeverity::Regular
        } else if self.warnings {
            LogSeverity::WarningsAndErrors
        } else if self.errors_only {
            LogSeverity::ErrorsOnly
        } else {
            LogSeverity::InfoOnly
        }
    }

    fn checks(&self) -> Vec<Check> {
        let flags = [
            (self.announce, Check::Announce),
            (self.ports, Check::Ports),
            (self.sequence_id, Check::SequenceId),
            (self.timing, Check::Timing),
            (self.matching, Check::Matching),
        ];

        if self.full || flags.iter().all(|(enabled, _)| !enabled) {
            return Check::ALL.to_vec();
        }
        flags
            .into_iter()
            .filter_map(|(enabled, check)| enabled.then_some(check))
            .collect()
    }

    fn analysis_config(&self) -> Result<AnalysisConfig> {
        Ok(match (self.rate_error, &self.config) {
            (Some(rate_error), _) => AnalysisConfig { rate_error },
            (None, Some(path)) => AnalysisConfig::from_file(path)?,
            (None, None) => AnalysisConfig::default(),
        })
    }
}

fn log_file_path(log_dir: &Path, capture: &Path) -> PathBuf {
    let stem = capture
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capture".to_string());
    log_dir.join(format!("{}.log", stem))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Reject a bad threshold before anything is read
    let config = cli.analysis_config()?;

    let log_file = log_file_path(&cli.log_dir, &cli.capture);
    let options = LoggerOptions {
        severity: cli.severity(),
        print: if cli.no_prints {
            PrintOption::NoPrints
        } else {
            PrintOption::PrintToConsole
        },
        log_file: Some(log_file.clone()),
    };
    logger::init_tracing(&options)?;

    let started = Instant::now();
    let logger = TracingLogger;

    let frames = source::read_capture(&cli.capture)?;
    let (messages, decode_stats) = stream::decode_frames(&frames);
    decode_stats.log(&logger);

    let stream = ClassifiedStream::build(messages);
    stream.log_summary(&logger);

    let report = analyser::analyse(&stream, &cli.checks(), &config, &logger);

    if options.print == PrintOption::PrintToConsole {
        println!();
        if report.is_empty() {
            println!("No PTP messages found in {}", cli.capture.display());
        } else {
            println!(
                "Analysis of {} PTP messages {} in {:.3} s",
                report.message_count,
                if report.passed() {
                    "passed"
                } else {
                    "found issues"
                },
                started.elapsed().as_secs_f64()
            );
        }
        if options.severity != LogSeverity::NoLogs {
            println!("Log file: {}", log_file.display());
        }
    }

    Ok(())
}
