//! Turns decoded frames into the analysis window: boundary trimming and
//! per-type classification.

use crate::logger::Logger;
use crate::source::RawFrame;
use crate::types::{DecodeError, PtpMessage, PtpMessageType, format_capture_date};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of decoding a capture. Frames that fail to decode are counted and
/// skipped.
#[derive(Debug, Default)]
pub struct DecodeStats {
    pub frames: usize,
    pub decoded: usize,
    pub failures: Vec<(usize, DecodeError)>,
}

impl DecodeStats {
    pub fn log(&self, logger: &dyn Logger) {
        logger.info(&format!(
            "Decoded {} of {} PTP frames",
            self.decoded, self.frames
        ));

        let mut by_reason: BTreeMap<String, usize> = BTreeMap::new();
        for (index, error) in &self.failures {
            logger.debug(&format!("Frame {} skipped: {}", index, error));
            let reason = match error {
                DecodeError::TruncatedHeader { .. } => "truncated header".to_string(),
                DecodeError::Truncated { message_type, .. } => {
                    format!("truncated {}", message_type)
                }
                DecodeError::UnsupportedVersion(v) => format!("PTP version {}", v),
            };
            *by_reason.entry(reason).or_default() += 1;
        }
        for (reason, count) in by_reason {
            logger.warning(&format!("Skipped {} frames: {}", count, reason));
        }
    }
}

pub fn decode_frames(frames: &[RawFrame]) -> (Vec<PtpMessage>, DecodeStats) {
    let mut stats = DecodeStats {
        frames: frames.len(),
        ..Default::default()
    };

    let messages = frames
        .iter()
        .enumerate()
        .filter_map(|(index, frame)| match PtpMessage::try_from(frame) {
            Ok(message) => Some(message),
            Err(e) => {
                stats.failures.push((index, e));
                None
            }
        })
        .collect::<Vec<_>>();

    stats.decoded = messages.len();
    (messages, stats)
}

/// Drop partial exchanges at both ends of the capture.
///
/// Head: Announce messages before the first Sync are kept, anything else
/// before it is dropped. Tail: everything after the last DelayResp or
/// PDelayRespFollowUp is dropped.
pub fn trim_boundaries(messages: Vec<PtpMessage>) -> Vec<PtpMessage> {
    let first_sync = messages
        .iter()
        .position(|m| m.message_type() == PtpMessageType::Sync)
        .unwrap_or(messages.len());

    let last_response = messages.iter().rposition(|m| {
        matches!(
            m.message_type(),
            PtpMessageType::DelayResp | PtpMessageType::PDelayRespFollowUp
        )
    });

    let Some(last_response) = last_response else {
        return Vec::new();
    };

    messages
        .into_iter()
        .enumerate()
        .filter(|(index, message)| {
            *index <= last_response
                && (*index >= first_sync || message.message_type() == PtpMessageType::Announce)
        })
        .map(|(_, message)| message)
        .collect()
}

/// The trimmed, classified analysis window. Messages are shared read-only
/// between the total list and the per-type buckets.
#[derive(Debug, Default, Clone)]
pub struct ClassifiedStream {
    pub total: Vec<Arc<PtpMessage>>,
    pub sync: Vec<Arc<PtpMessage>>,
    pub announce: Vec<Arc<PtpMessage>>,
    pub follow_up: Vec<Arc<PtpMessage>>,
    /// DelayReq and PDelayReq
    pub delay_req: Vec<Arc<PtpMessage>>,
    /// DelayResp and PDelayResp
    pub delay_resp: Vec<Arc<PtpMessage>>,
    pub delay_resp_follow_up: Vec<Arc<PtpMessage>>,
    pub signalling: Vec<Arc<PtpMessage>>,
    pub other: Vec<Arc<PtpMessage>>,
    /// Capture time of the first retained message.
    pub time_offset: Duration,
}

impl ClassifiedStream {
    pub fn build(messages: Vec<PtpMessage>) -> Self {
        let mut stream = ClassifiedStream::default();

        for message in trim_boundaries(messages) {
            let message = Arc::new(message);
            let bucket = match message.message_type() {
                PtpMessageType::Sync => &mut stream.sync,
                PtpMessageType::DelayReq | PtpMessageType::PDelayReq => &mut stream.delay_req,
                PtpMessageType::DelayResp | PtpMessageType::PDelayResp => &mut stream.delay_resp,
                PtpMessageType::FollowUp => &mut stream.follow_up,
                PtpMessageType::PDelayRespFollowUp => &mut stream.delay_resp_follow_up,
                PtpMessageType::Announce => &mut stream.announce,
                PtpMessageType::Signaling => &mut stream.signalling,
                PtpMessageType::Unknown(_) => &mut stream.other,
            };
            bucket.push(Arc::clone(&message));
            stream.total.push(message);
        }

        if let Some(first) = stream.total.first() {
            stream.time_offset = first.capture_time;
        }

        stream
    }

    pub fn is_empty(&self) -> bool {
        self.total.is_empty()
    }

    pub fn start_date(&self) -> Option<String> {
        self.total
            .first()
            .map(|m| format_capture_date(m.capture_time))
    }

    pub fn log_summary(&self, logger: &dyn Logger) {
        match self.start_date() {
            Some(date) => logger.info(&format!("Capture started at {}", date)),
            None => logger.info("Provided stream empty!"),
        }

        logger.banner_small("counted messages");
        logger.info("PTP filtered messages:");
        for (name, count) in [
            ("Announce", self.announce.len()),
            ("Sync", self.sync.len()),
            ("Follow-up", self.follow_up.len()),
            ("Delay Request", self.delay_req.len()),
            ("Delay Response", self.delay_resp.len()),
            ("Delay Response Follow-up", self.delay_resp_follow_up.len()),
            ("Signalling", self.signalling.len()),
            ("Other PTP messages", self.other.len()),
            ("PTP messages total", self.total.len()),
        ] {
            logger.info(&format!("    {}: {}", name, count));
        }
    }
}
