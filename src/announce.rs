//! Announce consistency: every Announce in a capture must advertise the same
//! grandmaster and clock quality as the first one.

use crate::logger::Logger;
use crate::types::{
    ClockAccuracy, ClockClass, ClockIdentity, PortIdentity, PtpMessage, TimeSource,
};
use std::sync::Arc;
use std::time::Duration;

/// Grandmaster identity and clock quality advertised by one Announce message.
///
/// The default value is the "no announce seen" sentinel: everything zero and
/// the accuracy unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnnounceBaseline {
    pub source_port_identity: PortIdentity,
    pub utc_offset: i16,
    pub priority1: u8,
    pub clock_class: ClockClass,
    pub clock_accuracy: ClockAccuracy,
    pub clock_variance: u16,
    pub priority2: u8,
    pub grandmaster_identity: ClockIdentity,
    pub steps_removed: u16,
    pub time_source: TimeSource,
}

impl AnnounceBaseline {
    pub fn from_message(message: &PtpMessage) -> Option<Self> {
        let announce = message.announce()?;
        Some(Self {
            source_port_identity: message.source_port_identity(),
            utc_offset: announce.utc_offset,
            priority1: announce.priority1,
            clock_class: announce.clock_class,
            clock_accuracy: announce.clock_accuracy,
            clock_variance: announce.clock_variance,
            priority2: announce.priority2,
            grandmaster_identity: announce.grandmaster_identity,
            steps_removed: announce.steps_removed,
            time_source: announce.time_source,
        })
    }

    pub fn log(&self, logger: &dyn Logger) {
        logger.info("PTP signal source data from announce msg:");
        for line in [
            format!("Clock ID: {}", self.source_port_identity),
            format!("UTC Offset: {}", self.utc_offset),
            format!("priority1: {}", self.priority1),
            format!("grandmasterClockClass: {}", self.clock_class),
            format!("grandmasterClockAccuracy: {}", self.clock_accuracy),
            format!("grandmasterClockVariance: {}", self.clock_variance),
            format!("priority2: {}", self.priority2),
            format!("grandmasterClockIdentity: {}", self.grandmaster_identity),
            format!("localStepsRemoved: {}", self.steps_removed),
            format!("TimeSource: {}", self.time_source),
        ] {
            logger.info(&format!("    {}", line));
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnnounceReport {
    pub baseline: AnnounceBaseline,
    pub count: usize,
    /// Messages whose data differs from the baseline.
    pub inconsistent: Vec<Arc<PtpMessage>>,
    /// The list held something other than Announce messages.
    pub invalid_input: bool,
}

impl AnnounceReport {
    pub fn passed(&self) -> bool {
        !self.invalid_input && self.inconsistent.is_empty()
    }

    pub fn log(&self, logger: &dyn Logger, time_offset: Duration) {
        if self.invalid_input {
            logger.error("PTP Announce input invalid!");
            return;
        }
        if self.count == 0 {
            logger.info("PTP Announce list empty.");
            return;
        }

        logger.banner_large("PTP Announce");
        if !self.inconsistent.is_empty() {
            logger.banner_small("Inconsistent Announce messages");
            for message in &self.inconsistent {
                logger.msg_timing(message, time_offset);
            }
            logger.warning(&format!(
                "Number of inconsistencies: {}",
                self.inconsistent.len()
            ));
        } else {
            logger.info("PTP Announce stream: [OK]");
        }
        self.baseline.log(logger);
    }
}

/// Compare every Announce message against the first one.
pub fn check(announce: &[Arc<PtpMessage>]) -> AnnounceReport {
    let mut report = AnnounceReport {
        count: announce.len(),
        ..Default::default()
    };

    let Some(first) = announce.first() else {
        return report;
    };
    let Some(baseline) = AnnounceBaseline::from_message(first) else {
        report.invalid_input = true;
        return report;
    };
    report.baseline = baseline;

    for message in announce {
        match AnnounceBaseline::from_message(message) {
            Some(data) if data == baseline => {}
            Some(_) => report.inconsistent.push(Arc::clone(message)),
            None => {
                report.invalid_input = true;
                report.inconsistent.clear();
                return report;
            }
        }
    }

    report
}
