//! MAC address and port identity stability of the master and requester roles.

use crate::logger::Logger;
use crate::types::{PortIdentity, PtpMessage, PtpMessageType};
use pnet::util::MacAddr;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

/// Fewer messages than this are not a meaningful sample.
pub const MINIMAL_MESSAGE_NUMBER_REQUIRED: usize = 5;

/// Individual/group bit of the first transmitted octet.
pub fn is_multicast(mac: &MacAddr) -> bool {
    mac.0 & 0x01 == 0x01
}

fn mac_with_mark(mac: &MacAddr) -> String {
    if is_multicast(mac) {
        format!("{} - Multicast", mac)
    } else {
        mac.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRole {
    pub source_mac: MacAddr,
    pub dest_mac: MacAddr,
    pub port_identity: PortIdentity,
}

impl PortRole {
    pub fn of(message: &PtpMessage) -> Self {
        Self {
            source_mac: message.source_mac,
            dest_mac: message.dest_mac,
            port_identity: message.source_port_identity(),
        }
    }
}

impl Display for PortRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MAC {}, destination {}, clock id and port {}",
            self.source_mac,
            mac_with_mark(&self.dest_mac),
            self.port_identity
        )
    }
}

fn describe(role: &Option<PortRole>) -> String {
    match role {
        Some(role) => role.to_string(),
        None => "none".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortIssueKind {
    /// Sync, FollowUp or Announce disagreeing with the source role.
    Source,
    /// DelayReq or PDelayReq disagreeing with the requester role.
    Requester,
    /// A response disagreeing with either role.
    Response,
}

#[derive(Debug, Clone)]
pub struct PortIssue {
    pub kind: PortIssueKind,
    pub message: Arc<PtpMessage>,
    /// Role values registered when the message arrived.
    pub source: Option<PortRole>,
    pub requester: Option<PortRole>,
}

#[derive(Debug, Clone, Default)]
pub struct PortReport {
    pub message_count: usize,
    pub issues: Vec<PortIssue>,
    pub source: Option<PortRole>,
    pub requester: Option<PortRole>,
}

impl PortReport {
    pub fn too_few_messages(&self) -> bool {
        self.message_count < MINIMAL_MESSAGE_NUMBER_REQUIRED
    }

    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn log(&self, logger: &dyn Logger, time_offset: Duration) {
        logger.banner_large("PTP message MAC address and clock id analysis");
        if self.too_few_messages() {
            logger.info("Not enough PTP messages to perform valid port check.");
            return;
        }

        for issue in &self.issues {
            let message = &issue.message;
            logger.warning(&format!(
                "{} msg inconsistent with previous port data!",
                message.message_type()
            ));
            match issue.kind {
                PortIssueKind::Source | PortIssueKind::Response => {
                    logger.warning(&format!("    Registered source: {}", describe(&issue.source)));
                }
                PortIssueKind::Requester => {}
            }
            match issue.kind {
                PortIssueKind::Requester | PortIssueKind::Response => {
                    logger.warning(&format!(
                        "    Registered requester: {}",
                        describe(&issue.requester)
                    ));
                }
                PortIssueKind::Source => {}
            }
            logger.warning(&format!("    Processed message: {}", PortRole::of(message)));
            if let Some(requesting) = message.requesting_port_identity() {
                logger.warning(&format!("    Requesting clock id and port: {}", requesting));
            }
            logger.msg_timing(message, time_offset);
        }

        if self.issues.is_empty() {
            logger.info("PTP Clock ID and MAC addresses: [OK]");
        } else {
            logger.info(&format!(
                "PTP Clock ID and MAC number of issues found: {}",
                self.issues.len()
            ));
        }

        logger.banner_small("Port and clock id addresses");
        logger.info("Last PTP MAC address and Clock ID data:");
        logger.info(&format!("    PTP source: {}", describe(&self.source)));
        logger.info(&format!("    PTP requester: {}", describe(&self.requester)));
    }
}

/// Latched role state. A role is cleared on a mismatch so the next message
/// of its kind latches it again.
#[derive(Debug, Default)]
struct RoleLatch {
    source: Option<PortRole>,
    requester: Option<PortRole>,
}

impl RoleLatch {
    fn step(&mut self, message: &Arc<PtpMessage>) -> Option<PortIssueKind> {
        let message_type = message.message_type();
        let observed = PortRole::of(message);

        match message_type {
            PtpMessageType::Sync | PtpMessageType::FollowUp | PtpMessageType::Announce => {
                let latched = *self.source.get_or_insert(observed);
                if latched != observed {
                    self.source = None;
                    return Some(PortIssueKind::Source);
                }
            }
            PtpMessageType::DelayReq | PtpMessageType::PDelayReq => {
                let latched = *self.requester.get_or_insert(observed);
                if latched != observed {
                    self.requester = None;
                    return Some(PortIssueKind::Requester);
                }
            }
            PtpMessageType::DelayResp
            | PtpMessageType::PDelayResp
            | PtpMessageType::PDelayRespFollowUp => {
                let requester = self.requester?;
                if self.source != Some(observed)
                    || message.requesting_port_identity() != Some(requester.port_identity)
                {
                    return Some(PortIssueKind::Response);
                }
            }
            _ => {}
        }

        None
    }
}

pub fn check(messages: &[Arc<PtpMessage>]) -> PortReport {
    let mut report = PortReport {
        message_count: messages.len(),
        ..Default::default()
    };
    if report.too_few_messages() {
        return report;
    }

    let mut latch = RoleLatch::default();
    for message in messages {
        let (source, requester) = (latch.source, latch.requester);
        if let Some(kind) = latch.step(message) {
            report.issues.push(PortIssue {
                kind,
                message: Arc::clone(message),
                source,
                requester,
            });
        }
    }

    report.source = latch.source;
    report.requester = latch.requester;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MessageBuilder, RecordingLogger, mac, multicast_mac, port};

    fn sync(seq: u16) -> MessageBuilder {
        MessageBuilder::new(PtpMessageType::Sync)
            .seq(seq)
            .at_millis(seq as u64 * 125)
    }

    fn master_exchange(seq: u16) -> Vec<Arc<PtpMessage>> {
        vec![
            sync(seq).arc(),
            MessageBuilder::new(PtpMessageType::FollowUp).seq(seq).arc(),
            MessageBuilder::new(PtpMessageType::DelayReq)
                .seq(seq)
                .macs(mac(2), multicast_mac())
                .source_port(port(2, 1))
                .arc(),
            MessageBuilder::new(PtpMessageType::DelayResp)
                .seq(seq)
                .requesting_port(port(2, 1))
                .arc(),
        ]
    }

    #[test]
    fn multicast_bit() {
        assert!(is_multicast(&multicast_mac()));
        assert!(is_multicast(&MacAddr::new(0x33, 0x33, 0, 0, 1, 0x81)));
        assert!(!is_multicast(&mac(1)));
        assert!(mac_with_mark(&multicast_mac()).ends_with("- Multicast"));
    }

    #[test]
    fn consistent_exchanges_pass() {
        let messages: Vec<_> = (0..3).flat_map(master_exchange).collect();
        let report = check(&messages);

        assert!(report.passed());
        assert_eq!(report.source.unwrap().port_identity, port(1, 1));
        assert_eq!(report.requester.unwrap().source_mac, mac(2));
    }

    #[test]
    fn changed_identity_is_one_issue_then_relatches() {
        let mut messages: Vec<_> = (0..5).map(|seq| sync(seq).arc()).collect();
        messages.push(sync(5).source_port(port(7, 1)).arc());
        messages.push(sync(6).source_port(port(7, 1)).arc());
        messages.push(sync(7).source_port(port(7, 1)).arc());

        let report = check(&messages);

        assert_eq!(report.issues.len(), 1);
        let issue = &report.issues[0];
        assert_eq!(issue.kind, PortIssueKind::Source);
        assert_eq!(issue.message.sequence_id(), 5);
        assert_eq!(issue.source.unwrap().port_identity, port(1, 1));
        assert_eq!(report.source.unwrap().port_identity, port(7, 1));
    }

    #[test]
    fn response_before_any_request_is_skipped() {
        let mut messages: Vec<_> = (0..5).map(|seq| sync(seq).arc()).collect();
        messages.push(
            MessageBuilder::new(PtpMessageType::DelayResp)
                .requesting_port(port(9, 9))
                .arc(),
        );

        assert!(check(&messages).passed());
    }

    #[test]
    fn response_for_other_requester_is_an_issue() {
        let mut messages = master_exchange(0);
        messages.extend(master_exchange(1));
        messages.push(
            MessageBuilder::new(PtpMessageType::DelayResp)
                .seq(1)
                .requesting_port(port(3, 1))
                .arc(),
        );

        let report = check(&messages);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, PortIssueKind::Response);
        // Responses never reset a role
        assert!(report.requester.is_some());

        let logger = RecordingLogger::default();
        report.log(&logger, Duration::ZERO);
        assert!(logger.contains("number of issues found: 1"));
        assert!(logger.contains("00:1b:19:00:00:03/1"));
    }

    #[test]
    fn response_after_source_reset_is_an_issue() {
        let mut messages = master_exchange(0);
        messages.push(sync(1).macs(mac(5), multicast_mac()).arc());
        messages.push(
            MessageBuilder::new(PtpMessageType::DelayResp)
                .seq(1)
                .requesting_port(port(2, 1))
                .arc(),
        );

        let report = check(&messages);
        let kinds: Vec<_> = report.issues.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![PortIssueKind::Source, PortIssueKind::Response]);
    }

    #[test]
    fn too_few_messages_short_circuits() {
        let messages: Vec<_> = (0..4).map(|seq| sync(seq).arc()).collect();
        let report = check(&messages);
        assert!(report.too_few_messages());
        assert!(report.passed());
        assert!(report.source.is_none());

        let logger = RecordingLogger::default();
        report.log(&logger, Duration::ZERO);
        assert!(logger.contains("Not enough PTP messages"));
    }
}
