//! Sequence ID continuity and cross-type completeness checks.

use crate::logger::Logger;
use crate::stream::ClassifiedStream;
use crate::types::PtpMessage;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Difference accepted as a counter rollover.
///
/// A clean 65535 -> 0 wrap produces -65535; this value is kept as found in
/// deployed captures until a trace with a real rollover confirms either one.
pub const SEQUENCE_ID_ROLLOVER_DIFF: i32 = -0xFFFE;

#[derive(Debug, Clone)]
pub struct Discontinuity {
    pub current: Arc<PtpMessage>,
    pub next: Arc<PtpMessage>,
    pub diff: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthMismatch {
    pub first: &'static str,
    pub first_len: usize,
    pub second: &'static str,
    pub second_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingIds {
    /// The list the IDs are missing from.
    pub missing_in: &'static str,
    /// The list that carries them.
    pub present_in: &'static str,
    pub ids: BTreeSet<u16>,
}

pub fn sequence_diff(current: &PtpMessage, next: &PtpMessage) -> i32 {
    next.sequence_id() as i32 - current.sequence_id() as i32
}

/// Every adjacent pair whose IDs do not advance by one (or roll over).
pub fn check_order(messages: &[Arc<PtpMessage>]) -> Vec<Discontinuity> {
    messages
        .windows(2)
        .filter_map(|pair| {
            let diff = sequence_diff(&pair[0], &pair[1]);
            (diff != 1 && diff != SEQUENCE_ID_ROLLOVER_DIFF).then(|| Discontinuity {
                current: Arc::clone(&pair[0]),
                next: Arc::clone(&pair[1]),
                diff,
            })
        })
        .collect()
}

/// IDs present in `subset` that `superset` lacks.
pub fn missing_from_superset(
    superset: &[Arc<PtpMessage>],
    subset: &[Arc<PtpMessage>],
) -> BTreeSet<u16> {
    let known: BTreeSet<u16> = superset.iter().map(|m| m.sequence_id()).collect();
    subset
        .iter()
        .map(|m| m.sequence_id())
        .filter(|id| !known.contains(id))
        .collect()
}

pub fn check_length_parity(
    first: (&'static str, &[Arc<PtpMessage>]),
    second: (&'static str, &[Arc<PtpMessage>]),
) -> Option<LengthMismatch> {
    (first.1.len() != second.1.len()).then(|| LengthMismatch {
        first: first.0,
        first_len: first.1.len(),
        second: second.0,
        second_len: second.1.len(),
    })
}

/// One named check, composed from the primitives above.
#[derive(Debug, Clone)]
pub struct SequenceCheck {
    pub name: &'static str,
    pub length_mismatch: Option<LengthMismatch>,
    pub discontinuities: Vec<Discontinuity>,
    pub missing: Vec<MissingIds>,
}

impl SequenceCheck {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            length_mismatch: None,
            discontinuities: Vec::new(),
            missing: Vec::new(),
        }
    }

    fn with_order(mut self, messages: &[Arc<PtpMessage>]) -> Self {
        self.discontinuities = check_order(messages);
        self
    }

    fn with_parity(
        mut self,
        first: (&'static str, &[Arc<PtpMessage>]),
        second: (&'static str, &[Arc<PtpMessage>]),
    ) -> Self {
        self.length_mismatch = check_length_parity(first, second);
        self
    }

    /// Completeness in both directions between two related lists.
    fn with_pairing(
        mut self,
        first: (&'static str, &[Arc<PtpMessage>]),
        second: (&'static str, &[Arc<PtpMessage>]),
    ) -> Self {
        for (superset, subset) in [(first, second), (second, first)] {
            let ids = missing_from_superset(superset.1, subset.1);
            if !ids.is_empty() {
                self.missing.push(MissingIds {
                    missing_in: superset.0,
                    present_in: subset.0,
                    ids,
                });
            }
        }
        self
    }

    pub fn passed(&self) -> bool {
        self.length_mismatch.is_none() && self.discontinuities.is_empty() && self.missing.is_empty()
    }

    pub fn log(&self, logger: &dyn Logger, time_offset: Duration) {
        logger.banner_small(&format!("{} message sequence id", self.name));

        if let Some(mismatch) = &self.length_mismatch {
            logger.warning(&format!(
                "Number of {} ({}) and {} ({}) messages mismatch!",
                mismatch.first, mismatch.first_len, mismatch.second, mismatch.second_len
            ));
        }

        for discontinuity in &self.discontinuities {
            logger.warning(&format!(
                "{} msg sequenceId mismatch with next msg: diff: {}, next id: {}",
                self.name,
                discontinuity.diff,
                discontinuity.next.sequence_id()
            ));
            logger.msg_timing(&discontinuity.current, time_offset);
        }
        if !self.discontinuities.is_empty() {
            logger.info(&format!(
                "{} number of sequence Id inconsistencies: {}",
                self.name,
                self.discontinuities.len()
            ));
        }

        for missing in &self.missing {
            logger.warning(&format!(
                "{} missing msgs to {} msgs with Id: {:?}",
                missing.missing_in, missing.present_in, missing.ids
            ));
        }

        if self.passed() {
            logger.info(&format!("{} msg sequenceId: [OK]", self.name));
        } else {
            logger.info(&format!("{} msg sequenceId: [FAILED]", self.name));
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SequenceReport {
    pub checks: Vec<SequenceCheck>,
}

impl SequenceReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(SequenceCheck::passed)
    }

    pub fn inconsistencies(&self) -> usize {
        self.checks.iter().map(|c| c.discontinuities.len()).sum()
    }

    pub fn log(&self, logger: &dyn Logger, time_offset: Duration) {
        logger.banner_large("ptp messages sequence id analysis");
        for check in &self.checks {
            check.log(logger, time_offset);
        }
        logger.new_line();
        logger.info(&format!(
            "Total sequence Id inconsistencies: {}",
            self.inconsistencies()
        ));
    }
}

/// Run every sequence check that has data to look at. Empty lists are skipped.
pub fn analyze(stream: &ClassifiedStream) -> SequenceReport {
    let sync = ("Sync", stream.sync.as_slice());
    let follow_up = ("Follow-up", stream.follow_up.as_slice());
    let delay_req = ("Delay Req", stream.delay_req.as_slice());
    let delay_resp = ("Delay Resp", stream.delay_resp.as_slice());
    let delay_resp_fup = ("Delay Resp Follow-up", stream.delay_resp_follow_up.as_slice());

    let mut checks = Vec::new();

    if !sync.1.is_empty() {
        checks.push(SequenceCheck::new(sync.0).with_order(sync.1));
    }

    if !follow_up.1.is_empty() {
        checks.push(
            SequenceCheck::new(follow_up.0)
                .with_parity(sync, follow_up)
                .with_order(follow_up.1)
                .with_pairing(sync, follow_up),
        );
    }

    if !delay_req.1.is_empty() {
        checks.push(
            SequenceCheck::new(delay_req.0)
                .with_parity(delay_req, delay_resp)
                .with_order(delay_req.1),
        );
    }

    if !delay_resp.1.is_empty() {
        checks.push(
            SequenceCheck::new(delay_resp.0)
                .with_order(delay_resp.1)
                .with_pairing(delay_req, delay_resp),
        );
    }

    if !delay_resp_fup.1.is_empty() {
        checks.push(
            SequenceCheck::new(delay_resp_fup.0)
                .with_parity(delay_resp_fup, delay_resp)
                .with_order(delay_resp_fup.1)
                .with_pairing(delay_resp, delay_resp_fup),
        );
    }

    SequenceReport { checks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MessageBuilder, RecordingLogger, sync_train};
    use crate::types::PtpMessageType;
    use proptest::prelude::*;

    fn with_ids(message_type: PtpMessageType, ids: &[u16]) -> Vec<Arc<PtpMessage>> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                MessageBuilder::new(message_type)
                    .seq(*id)
                    .at_millis(i as u64 * 125)
                    .arc()
            })
            .collect()
    }

    #[test]
    fn consecutive_ids_are_in_order() {
        assert!(check_order(&sync_train(32, 125_000_000)).is_empty());
    }

    #[test]
    fn one_broken_id_is_one_discontinuity() {
        let mut ids: Vec<u16> = (100..120).collect();
        *ids.last_mut().unwrap() = 200;

        let found = check_order(&with_ids(PtpMessageType::Sync, &ids));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].diff, 200 - 118);
        assert_eq!(found[0].current.sequence_id(), 118);
    }

    #[test]
    fn rollover_constant_is_accepted_as_found() {
        // 65534 -> 0 matches the accepted constant
        assert!(check_order(&with_ids(PtpMessageType::Sync, &[65533, 65534, 0, 1])).is_empty());

        // A clean 65535 -> 0 wrap (-65535) is still reported pending a real capture
        let found = check_order(&with_ids(PtpMessageType::Sync, &[65534, 65535, 0]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].diff, -65535);
    }

    #[test]
    fn missing_ids_are_those_absent_from_superset() {
        let sync = with_ids(PtpMessageType::Sync, &[1, 2, 3, 4]);
        let follow_up = with_ids(PtpMessageType::FollowUp, &[1, 2, 4, 5]);

        assert_eq!(
            missing_from_superset(&sync, &follow_up),
            BTreeSet::from([5])
        );
        assert_eq!(
            missing_from_superset(&follow_up, &sync),
            BTreeSet::from([3])
        );
        assert!(missing_from_superset(&sync, &sync).is_empty());
    }

    #[test]
    fn length_parity() {
        let sync = with_ids(PtpMessageType::Sync, &[1, 2, 3]);
        let follow_up = with_ids(PtpMessageType::FollowUp, &[1, 2]);

        assert_eq!(
            check_length_parity(("Sync", &sync), ("Follow-up", &follow_up)),
            Some(LengthMismatch {
                first: "Sync",
                first_len: 3,
                second: "Follow-up",
                second_len: 2,
            })
        );
        assert_eq!(check_length_parity(("Sync", &sync), ("Sync", &sync)), None);
    }

    #[test]
    fn analyze_clean_stream() {
        let stream = ClassifiedStream {
            sync: with_ids(PtpMessageType::Sync, &[1, 2, 3]),
            follow_up: with_ids(PtpMessageType::FollowUp, &[1, 2, 3]),
            delay_req: with_ids(PtpMessageType::DelayReq, &[7, 8]),
            delay_resp: with_ids(PtpMessageType::DelayResp, &[7, 8]),
            ..Default::default()
        };

        let report = analyze(&stream);
        assert_eq!(report.checks.len(), 4);
        assert!(report.passed());

        let logger = RecordingLogger::default();
        report.log(&logger, Duration::ZERO);
        assert!(logger.contains("Follow-up msg sequenceId: [OK]"));
        assert!(!logger.contains("[FAILED]"));
    }

    #[test]
    fn analyze_reports_unanswered_requests() {
        let stream = ClassifiedStream {
            sync: with_ids(PtpMessageType::Sync, &[1]),
            delay_req: with_ids(PtpMessageType::DelayReq, &[7, 8, 9]),
            delay_resp: with_ids(PtpMessageType::DelayResp, &[7, 9]),
            ..Default::default()
        };

        let report = analyze(&stream);
        assert!(!report.passed());

        let req = &report.checks[1];
        assert_eq!(req.name, "Delay Req");
        assert!(req.length_mismatch.is_some());
        assert!(req.discontinuities.is_empty());

        let resp = &report.checks[2];
        assert_eq!(resp.discontinuities.len(), 1);
        assert_eq!(
            resp.missing,
            vec![MissingIds {
                missing_in: "Delay Resp",
                present_in: "Delay Req",
                ids: BTreeSet::from([8]),
            }]
        );
    }

    #[test]
    fn empty_stream_has_no_checks() {
        let report = analyze(&ClassifiedStream::default());
        assert!(report.checks.is_empty());
        assert!(report.passed());
    }

    proptest! {
        #[test]
        fn a_single_gap_is_a_single_discontinuity(
            start in 0u16..60_000,
            len in 2usize..200,
            gap_at in 1usize..200,
            shift in 1u16..100,
        ) {
            let gap_at = gap_at % len;
            prop_assume!(gap_at > 0);

            let ids: Vec<u16> = (0..len)
                .map(|i| start + i as u16 + if i >= gap_at { shift } else { 0 })
                .collect();

            let found = check_order(&with_ids(PtpMessageType::Sync, &ids));
            prop_assert_eq!(found.len(), 1);
            prop_assert_eq!(found[0].diff, 1 + shift as i32);
            prop_assert_eq!(found[0].next.sequence_id(), ids[gap_at]);
        }
    }
}
