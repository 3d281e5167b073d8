use crate::announce::{self, AnnounceReport};
use crate::config::AnalysisConfig;
use crate::exchange::{self, ExchangeReport};
use crate::logger::Logger;
use crate::ports::{self, PortReport};
use crate::sequence::{self, SequenceReport};
use crate::stream::ClassifiedStream;
use crate::timing::{self, TimingReport};

/// Checkers in the order a run executes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Check {
    Announce,
    Ports,
    SequenceId,
    Timing,
    Matching,
}

impl Check {
    pub const ALL: [Check; 5] = [
        Check::Announce,
        Check::Ports,
        Check::SequenceId,
        Check::Timing,
        Check::Matching,
    ];
}

/// Results of every checker that ran; `None` for the ones not selected.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    pub message_count: usize,
    pub announce: Option<AnnounceReport>,
    pub ports: Option<PortReport>,
    pub sequence: Option<SequenceReport>,
    /// Announce, Sync and FollowUp timing, for the types present.
    pub timing: Vec<TimingReport>,
    pub exchanges: Option<ExchangeReport>,
}

impl AnalysisReport {
    pub fn is_empty(&self) -> bool {
        self.message_count == 0
    }

    pub fn passed(&self) -> bool {
        self.announce.as_ref().is_none_or(AnnounceReport::passed)
            && self.ports.as_ref().is_none_or(PortReport::passed)
            && self.sequence.as_ref().is_none_or(SequenceReport::passed)
            && self.timing.iter().all(|t| t.success)
            && self.exchanges.as_ref().is_none_or(ExchangeReport::passed)
    }
}

/// Run the selected checks over `stream` in their fixed order, logging each
/// result as it completes.
pub fn analyse(
    stream: &ClassifiedStream,
    checks: &[Check],
    config: &AnalysisConfig,
    logger: &dyn Logger,
) -> AnalysisReport {
    let mut report = AnalysisReport {
        message_count: stream.total.len(),
        ..Default::default()
    };

    if stream.is_empty() {
        logger.error("PTP stream empty");
        return report;
    }

    let offset = stream.time_offset;
    let selected = |check: Check| checks.contains(&check);

    if selected(Check::Announce) {
        let result = announce::check(&stream.announce);
        result.log(logger, offset);
        report.announce = Some(result);
    }

    if selected(Check::Ports) {
        let result = ports::check(&stream.total);
        result.log(logger, offset);
        report.ports = Some(result);
    }

    if selected(Check::SequenceId) {
        let result = sequence::analyze(stream);
        result.log(logger, offset);
        report.sequence = Some(result);
    }

    if selected(Check::Timing) {
        logger.banner_large("ptp timing and rate");
        for messages in [&stream.announce, &stream.sync, &stream.follow_up] {
            if messages.is_empty() {
                continue;
            }
            match timing::analyze(messages, config.rate_error) {
                Ok(result) => {
                    result.log(logger, offset);
                    report.timing.push(result);
                }
                Err(e) => logger.error(&e.to_string()),
            }
        }
    }

    if selected(Check::Matching) {
        if stream.sync.is_empty() {
            logger.error("No PTP Sync messages");
        } else {
            let result = exchange::analyze(&stream.total);
            result.log(logger, offset);
            report.exchanges = Some(result);
        }
    }

    logger.new_line();
    if report.passed() {
        logger.info("PTP stream analysis: [OK]");
    } else {
        logger.warning("PTP stream analysis: issues found");
    }

    report
}
