//! Reconstruction of Sync -> DelayReq -> DelayResp exchanges from an
//! interleaved message stream.
//!
//! The matcher is a three state machine driven one message at a time by
//! [`transition`]. Every message that leaves the machine without becoming
//! part of a committed exchange is reported through a [`MatchEvent`]:
//!
//! | State           | Input    | Events                                     | Next            |
//! |-----------------|----------|--------------------------------------------|-----------------|
//! | NewExchange     | Sync     |                                            | GotSync         |
//! | GotSync         | Sync     | UnmatchedSync(latched)                     | GotSync         |
//! | WaitingAtResp   | Sync     | UnmatchedSync(latched), Abandoned(request) | GotSync         |
//! | GotSync         | Request  |                                            | WaitingAtResp   |
//! | NewExchange     | Request  | UnmatchedRequest                           | NewExchange     |
//! | WaitingAtResp   | Request  | UnmatchedRequest, Abandoned(sync, request) | NewExchange     |
//! | WaitingAtResp   | Response | Committed or Discarded                     | NewExchange     |
//! | NewExchange     | Response | UnmatchedResponse                          | NewExchange     |
//! | GotSync         | Response | UnmatchedResponse, Abandoned(sync)         | NewExchange     |
//! | any             | other    |                                            | unchanged       |

use crate::logger::Logger;
use crate::stats::Summary;
use crate::types::{PtpMessage, PtpMessageType};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub enum MatcherState {
    #[default]
    NewExchange,
    GotSync {
        sync: Arc<PtpMessage>,
    },
    WaitingAtResp {
        sync: Arc<PtpMessage>,
        request: Arc<PtpMessage>,
    },
}

/// One reconstructed triplet. Both capture intervals are never negative.
#[derive(Debug, Clone)]
pub struct PtpExchange {
    pub sync: Arc<PtpMessage>,
    pub request: Arc<PtpMessage>,
    pub response: Arc<PtpMessage>,
    pub sync_to_request_micros: f64,
    pub request_to_response_micros: f64,
    /// T1 (Sync origin) to T4 (response receive) on the nanosecond fields.
    pub origin_to_receive_millis: Option<f64>,
}

impl PtpExchange {
    /// Build the exchange, or `None` if capture time runs backward inside it.
    pub fn try_new(
        sync: Arc<PtpMessage>,
        request: Arc<PtpMessage>,
        response: Arc<PtpMessage>,
    ) -> Option<Self> {
        let sync_to_request = request.capture_nanos() - sync.capture_nanos();
        let request_to_response = response.capture_nanos() - request.capture_nanos();
        if sync_to_request < 0 || request_to_response < 0 {
            return None;
        }

        let origin_to_receive_millis = match (sync.origin_timestamp(), response.receipt_timestamp())
        {
            (Some(t1), Some(t4)) => Some(t1.nanos_delta_wrapping(&t4) as f64 / 1_000_000.0),
            _ => None,
        };

        Some(Self {
            sync_to_request_micros: sync_to_request as f64 / 1_000.0,
            request_to_response_micros: request_to_response as f64 / 1_000.0,
            origin_to_receive_millis,
            sync,
            request,
            response,
        })
    }
}

#[derive(Debug, Clone)]
pub enum MatchEvent {
    UnmatchedSync(Arc<PtpMessage>),
    UnmatchedRequest(Arc<PtpMessage>),
    UnmatchedResponse(Arc<PtpMessage>),
    Committed(PtpExchange),
    /// Complete triplet rejected because capture time went backward.
    Discarded {
        sync: Arc<PtpMessage>,
        request: Arc<PtpMessage>,
        response: Arc<PtpMessage>,
    },
    /// Latched message dropped by a state reset or left pending at the end.
    Abandoned(Arc<PtpMessage>),
}

/// Advance the matcher by one message.
pub fn transition(state: MatcherState, message: &Arc<PtpMessage>) -> (MatcherState, Vec<MatchEvent>) {
    let message_type = message.message_type();
    let incoming = Arc::clone(message);

    if message_type == PtpMessageType::Sync {
        let events = match state {
            MatcherState::NewExchange => vec![],
            MatcherState::GotSync { sync } => vec![MatchEvent::UnmatchedSync(sync)],
            MatcherState::WaitingAtResp { sync, request } => vec![
                MatchEvent::UnmatchedSync(sync),
                MatchEvent::Abandoned(request),
            ],
        };
        return (MatcherState::GotSync { sync: incoming }, events);
    }

    if message_type.is_request() {
        return match state {
            MatcherState::GotSync { sync } => (
                MatcherState::WaitingAtResp {
                    sync,
                    request: incoming,
                },
                vec![],
            ),
            MatcherState::NewExchange => (
                MatcherState::NewExchange,
                vec![MatchEvent::UnmatchedRequest(incoming)],
            ),
            MatcherState::WaitingAtResp { sync, request } => (
                MatcherState::NewExchange,
                vec![
                    MatchEvent::UnmatchedRequest(incoming),
                    MatchEvent::Abandoned(sync),
                    MatchEvent::Abandoned(request),
                ],
            ),
        };
    }

    if message_type.is_response() {
        let events = match state {
            MatcherState::WaitingAtResp { sync, request } => {
                match PtpExchange::try_new(Arc::clone(&sync), Arc::clone(&request), Arc::clone(&incoming)) {
                    Some(exchange) => vec![MatchEvent::Committed(exchange)],
                    None => vec![MatchEvent::Discarded {
                        sync,
                        request,
                        response: incoming,
                    }],
                }
            }
            MatcherState::NewExchange => vec![MatchEvent::UnmatchedResponse(incoming)],
            MatcherState::GotSync { sync } => vec![
                MatchEvent::UnmatchedResponse(incoming),
                MatchEvent::Abandoned(sync),
            ],
        };
        return (MatcherState::NewExchange, events);
    }

    (state, vec![])
}

/// Events for whatever is still latched when the input ends.
pub fn finish(state: MatcherState) -> Vec<MatchEvent> {
    match state {
        MatcherState::NewExchange => vec![],
        MatcherState::GotSync { sync } => vec![MatchEvent::Abandoned(sync)],
        MatcherState::WaitingAtResp { sync, request } => {
            vec![MatchEvent::Abandoned(sync), MatchEvent::Abandoned(request)]
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExchangeReport {
    pub total: usize,
    pub exchanges: Vec<PtpExchange>,
    pub unmatched_syncs: Vec<Arc<PtpMessage>>,
    pub unmatched_requests: Vec<Arc<PtpMessage>>,
    pub unmatched_responses: Vec<Arc<PtpMessage>>,
    /// Triplets rejected for backward capture time. Their messages are also
    /// in the unmatched lists.
    pub discarded: Vec<Arc<PtpMessage>>,
    pub abandoned: Vec<Arc<PtpMessage>>,
    /// Messages that take no part in matching (Announce, FollowUp, ...).
    pub ignored: usize,
    pub sync_to_request: Option<Summary>,
    pub request_to_response: Option<Summary>,
    pub origin_to_receive: Option<Summary>,
}

impl ExchangeReport {
    fn record(&mut self, event: MatchEvent) {
        match event {
            MatchEvent::UnmatchedSync(sync) => self.unmatched_syncs.push(sync),
            MatchEvent::UnmatchedRequest(request) => self.unmatched_requests.push(request),
            MatchEvent::UnmatchedResponse(response) => self.unmatched_responses.push(response),
            MatchEvent::Committed(exchange) => self.exchanges.push(exchange),
            MatchEvent::Discarded {
                sync,
                request,
                response,
            } => {
                self.discarded.push(Arc::clone(&response));
                self.unmatched_syncs.push(sync);
                self.unmatched_requests.push(request);
                self.unmatched_responses.push(response);
            }
            MatchEvent::Abandoned(message) => self.abandoned.push(message),
        }
    }

    pub fn unmatched(&self) -> usize {
        self.unmatched_syncs.len() + self.unmatched_requests.len() + self.unmatched_responses.len()
    }

    pub fn passed(&self) -> bool {
        self.unmatched() == 0
    }

    pub fn log(&self, logger: &dyn Logger, time_offset: Duration) {
        logger.banner_large("sync / delay request / delay response matching");

        for response in &self.discarded {
            logger.error(&format!(
                "Exchange ending with {} seq {} discarded: capture time went backward",
                response.message_type(),
                response.sequence_id()
            ));
            logger.msg_timing(response, time_offset);
        }

        for (label, messages) in [
            ("Unhandled SYNC", &self.unmatched_syncs),
            ("Unordered DELAY_REQ", &self.unmatched_requests),
            ("Unordered DELAY_RESP", &self.unmatched_responses),
        ] {
            for message in messages {
                logger.warning(&format!("{} seq {}", label, message.sequence_id()));
                logger.msg_timing(message, time_offset);
            }
        }

        for message in &self.abandoned {
            logger.debug(&format!(
                "Abandoned {} seq {} at capture offset {:.9} s",
                message.message_type(),
                message.sequence_id(),
                message.capture_offset(time_offset)
            ));
        }

        for exchange in &self.exchanges {
            logger.debug(&format!(
                "Exchange {} seq {} / {} seq {} / {} seq {}",
                exchange.sync.message_type(),
                exchange.sync.sequence_id(),
                exchange.request.message_type(),
                exchange.request.sequence_id(),
                exchange.response.message_type(),
                exchange.response.sequence_id()
            ));
        }

        for (label, summary) in [
            ("Sync to Delay_Req capture time [us]", &self.sync_to_request),
            ("Delay_Req to Delay_Resp capture time [us]", &self.request_to_response),
            ("Sync origin to Delay_Resp receive time [ms]", &self.origin_to_receive),
        ] {
            match summary {
                Some(s) if s.min == s.max => {
                    logger.info(&format!("{} is constant: {:.3}", label, s.max))
                }
                Some(s) => logger.info(&format!("{}: {}", label, s)),
                None => {}
            }
        }

        logger.info("Ptp exchanges:");
        logger.info(&format!(
            "    Ptp Exchanges (SYNC-D_REQ-D_RESP): {}",
            self.exchanges.len()
        ));
        logger.info(&format!(
            "    Discarded (unhandled) Sync Msgs: {}",
            self.unmatched_syncs.len()
        ));
        logger.info(&format!(
            "    Discarded (unordered) Delay Reqs: {}",
            self.unmatched_requests.len()
        ));
        logger.info(&format!(
            "    Discarded (unordered) Delay Resps: {}",
            self.unmatched_responses.len()
        ));
        logger.info(&format!(
            "    Exchanges with backward capture time: {}",
            self.discarded.len()
        ));
        logger.info(&format!(
            "    Abandoned by state reset: {}",
            self.abandoned.len()
        ));
        logger.info(&format!("    Other PTP frames: {}", self.ignored));
        logger.info(&format!("    PTP frames total: {}", self.total));
    }
}

/// Run the matcher over an ordered message list.
pub fn analyze(messages: &[Arc<PtpMessage>]) -> ExchangeReport {
    let mut report = ExchangeReport {
        total: messages.len(),
        ..Default::default()
    };

    let mut state = MatcherState::NewExchange;
    for message in messages {
        let message_type = message.message_type();
        if message_type != PtpMessageType::Sync
            && !message_type.is_request()
            && !message_type.is_response()
        {
            report.ignored += 1;
        }

        let (next, events) = transition(state, message);
        state = next;
        for event in events {
            report.record(event);
        }
    }
    for event in finish(state) {
        report.record(event);
    }

    let summary = |f: fn(&PtpExchange) -> Option<f64>| {
        Summary::from_samples(&report.exchanges.iter().filter_map(f).collect::<Vec<_>>())
    };
    let sync_to_request = summary(|e| Some(e.sync_to_request_micros));
    let request_to_response = summary(|e| Some(e.request_to_response_micros));
    let origin_to_receive = summary(|e| e.origin_to_receive_millis);

    report.sync_to_request = sync_to_request;
    report.request_to_response = request_to_response;
    report.origin_to_receive = origin_to_receive;

    report
}
