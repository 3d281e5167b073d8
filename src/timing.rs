//! Message rate detection and interval regularity, on both the embedded PTP
//! timestamps and the capture timestamps.

use crate::logger::Logger;
use crate::stats::Summary;
use crate::types::{NANOS_PER_SEC, PtpMessage, PtpMessageType, PtpTimestamp};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Relative distance from a rate class still accepted as that class.
const RATE_MAX_DELTA_COEFFICIENT: f64 = 0.3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimingError {
    #[error("timing analysis needs a single message type, got {expected} and {found}")]
    MixedMessageTypes {
        expected: PtpMessageType,
        found: PtpMessageType,
    },
}

/// Standard PTP message rates, as the nominal gap between two messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgInterval {
    Rate1,
    Rate2,
    Rate4,
    Rate8,
    Rate16,
    Unknown,
}

impl MsgInterval {
    const CLASSES: [MsgInterval; 5] = [
        MsgInterval::Rate1,
        MsgInterval::Rate2,
        MsgInterval::Rate4,
        MsgInterval::Rate8,
        MsgInterval::Rate16,
    ];

    pub fn nanos(&self) -> i64 {
        match self {
            MsgInterval::Rate1 => 1_000_000_000,
            MsgInterval::Rate2 => 500_000_000,
            MsgInterval::Rate4 => 250_000_000,
            MsgInterval::Rate8 => 125_000_000,
            MsgInterval::Rate16 => 62_500_000,
            MsgInterval::Unknown => 0,
        }
    }

    pub fn messages_per_second(&self) -> u32 {
        match self {
            MsgInterval::Unknown => 0,
            known => (NANOS_PER_SEC / known.nanos()) as u32,
        }
    }

    /// Snap a measured rate (messages per second) to a class within ±30%.
    pub fn from_rate(rate: f64) -> Self {
        Self::CLASSES
            .into_iter()
            .find(|class| {
                let nominal = class.messages_per_second() as f64;
                let delta = nominal * RATE_MAX_DELTA_COEFFICIENT;
                nominal - delta < rate && rate < nominal + delta
            })
            .unwrap_or(MsgInterval::Unknown)
    }

    /// Rate advertised by `logMessageInterval` (2^n seconds), if it is a standard one.
    pub fn from_log_interval(log_message_interval: i8) -> Option<Self> {
        match log_message_interval {
            0 => Some(MsgInterval::Rate1),
            -1 => Some(MsgInterval::Rate2),
            -2 => Some(MsgInterval::Rate4),
            -3 => Some(MsgInterval::Rate8),
            -4 => Some(MsgInterval::Rate16),
            _ => None,
        }
    }
}

impl Display for MsgInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MsgInterval::Unknown => write!(f, "unknown rate"),
            MsgInterval::Rate1 => write!(f, "1 message per second"),
            known => write!(f, "{} messages per second", known.messages_per_second()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimingViolation {
    /// Later message of the offending pair.
    pub message: Arc<PtpMessage>,
    pub delta_ns: i64,
    /// `delta_ns` minus the nominal interval.
    pub error_ns: i64,
}

impl TimingViolation {
    pub fn rate(&self) -> f64 {
        if self.delta_ns > 0 {
            NANOS_PER_SEC as f64 / self.delta_ns as f64
        } else {
            f64::INFINITY
        }
    }
}

/// Samples and findings for one time axis.
#[derive(Debug, Clone, Default)]
pub struct AxisReport {
    /// Instantaneous rate of every adjacent pair with a positive gap.
    pub rates: Vec<f64>,
    pub violations: Vec<TimingViolation>,
    pub summary: Option<Summary>,
    /// Why the axis was not analysed, if it was not.
    pub skipped: Option<String>,
}

impl AxisReport {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(reason.into()),
            ..Default::default()
        }
    }

    fn walk(
        messages: &[Arc<PtpMessage>],
        nominal_ns: i64,
        threshold_ns: i64,
        delta: impl Fn(&PtpMessage, &PtpMessage) -> i64,
    ) -> Self {
        let mut axis = AxisReport::default();

        for pair in messages.windows(2) {
            let delta_ns = delta(pair[0].as_ref(), pair[1].as_ref());
            if delta_ns > 0 {
                axis.rates.push(NANOS_PER_SEC as f64 / delta_ns as f64);
            }

            let error_ns = delta_ns - nominal_ns;
            if delta_ns <= 0 || error_ns.abs() > threshold_ns {
                axis.violations.push(TimingViolation {
                    message: Arc::clone(&pair[1]),
                    delta_ns,
                    error_ns,
                });
            }
        }

        axis.summary = Summary::from_samples(&axis.rates);
        axis
    }

    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TimingReport {
    pub message_type: Option<PtpMessageType>,
    pub message_count: usize,
    pub interval: MsgInterval,
    /// Rate advertised by the first message's `logMessageInterval`.
    pub advertised: Option<MsgInterval>,
    pub threshold_ns: i64,
    pub timestamps: AxisReport,
    pub capture: AxisReport,
    pub success: bool,
}

impl TimingReport {
    fn empty(messages: &[Arc<PtpMessage>]) -> Self {
        Self {
            message_type: messages.first().map(|m| m.message_type()),
            message_count: messages.len(),
            interval: MsgInterval::Unknown,
            advertised: None,
            threshold_ns: 0,
            timestamps: AxisReport::default(),
            capture: AxisReport::default(),
            success: true,
        }
    }

    pub fn advertised_mismatch(&self) -> bool {
        matches!(self.advertised, Some(advertised)
            if self.interval != MsgInterval::Unknown && advertised != self.interval)
    }

    pub fn log(&self, logger: &dyn Logger, time_offset: Duration) {
        let name = match self.message_type {
            Some(message_type) => message_type.to_string(),
            None => {
                logger.info("Ptp Timing: no messages");
                return;
            }
        };

        if self.message_count < 2 {
            logger.info(&format!("Ptp Timing of {}: not enough data", name));
            return;
        }

        if self.interval == MsgInterval::Unknown {
            logger.error(&format!("Unable to determine msg rate of {}", name));
            return;
        }

        logger.info(&format!("Detected {} of {}", self.interval, name));
        if self.advertised_mismatch()
            && let Some(advertised) = self.advertised
        {
            logger.warning(&format!(
                "{} advertises {} in logMessageInterval",
                name, advertised
            ));
        }
        logger.info(&format!(
            "Allowed threshold: {} ns of {} ns expected time difference",
            self.threshold_ns,
            self.interval.nanos()
        ));

        for (axis_name, axis) in [("timestamp", &self.timestamps), ("capture time", &self.capture)]
        {
            if let Some(reason) = &axis.skipped {
                logger.warning(&format!("{} {} regularity skipped: {}", name, axis_name, reason));
                continue;
            }

            for violation in &axis.violations {
                logger.warning(&format!(
                    "{} msg {} is irregular, msg rate: {:.3}, time diff: {} ns, time err: {:.3} us",
                    name,
                    axis_name,
                    violation.rate(),
                    violation.delta_ns,
                    violation.error_ns as f64 / 1_000.0
                ));
                logger.msg_timing(&violation.message, time_offset);
            }

            if axis.passed() {
                logger.info(&format!(
                    "All {} msgs within threshold. {} regularity: OK",
                    name, axis_name
                ));
            } else {
                logger.warning(&format!(
                    "Number of {} irregularities of {}: {}",
                    axis_name,
                    name,
                    axis.violations.len()
                ));
            }

            if let Some(summary) = &axis.summary {
                logger.info(&format!("{} {} rate: {}", name, axis_name, summary));
            }
        }
    }
}

fn payload_timestamp(message: &PtpMessage) -> Option<PtpTimestamp> {
    message
        .origin_timestamp()
        .or_else(|| message.precise_origin_timestamp())
}

/// First-pair capture gap snapped to a rate class.
pub fn detect_interval(messages: &[Arc<PtpMessage>]) -> MsgInterval {
    match messages {
        [first, second, ..] => {
            let delta = (second.capture_nanos() - first.capture_nanos()) as f64;
            if delta <= 0.0 {
                MsgInterval::Unknown
            } else {
                MsgInterval::from_rate(NANOS_PER_SEC as f64 / delta)
            }
        }
        _ => MsgInterval::Unknown,
    }
}

/// Analyse a list of messages of one type. `rate_error` is the allowed
/// relative deviation from the nominal interval (0.01 = 1%).
pub fn analyze(
    messages: &[Arc<PtpMessage>],
    rate_error: f64,
) -> Result<TimingReport, TimingError> {
    if let Some(first) = messages.first()
        && let Some(odd) = messages
            .iter()
            .find(|m| m.message_type() != first.message_type())
    {
        return Err(TimingError::MixedMessageTypes {
            expected: first.message_type(),
            found: odd.message_type(),
        });
    }

    let mut report = TimingReport::empty(messages);
    if messages.len() < 2 {
        return Ok(report);
    }

    report.advertised = MsgInterval::from_log_interval(messages[0].header.log_message_interval);
    report.interval = detect_interval(messages);
    if report.interval == MsgInterval::Unknown {
        report.success = false;
        return Ok(report);
    }

    let nominal_ns = report.interval.nanos();
    report.threshold_ns = (nominal_ns as f64 * rate_error) as i64;

    // Full seconds + nanoseconds difference; at 1 msg/s the nanosecond
    // field alone would read every gap as zero.
    let stamps: Option<Vec<PtpTimestamp>> = messages.iter().map(|m| payload_timestamp(m)).collect();
    report.timestamps = match stamps {
        None => AxisReport::skipped("message type carries no origin timestamp"),
        Some(stamps) if stamps.iter().any(|t| t.seconds == 0) => {
            AxisReport::skipped("origin timestamp not populated (two-step clock)")
        }
        Some(_) => AxisReport::walk(messages, nominal_ns, report.threshold_ns, |a, b| {
            match (payload_timestamp(a), payload_timestamp(b)) {
                (Some(a), Some(b)) => a.nanos_until(&b),
                _ => 0,
            }
        }),
    };

    report.capture = AxisReport::walk(messages, nominal_ns, report.threshold_ns, |a, b| {
        (b.capture_nanos() - a.capture_nanos()) as i64
    });

    report.success = report.timestamps.passed() && report.capture.passed();
    Ok(report)
}
