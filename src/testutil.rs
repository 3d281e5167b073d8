//! Synthetic PTP traffic for unit tests.

use crate::logger::Logger;
use crate::source::RawFrame;
use crate::types::{
    AnnounceBody, ClockIdentity, PortIdentity, PtpBody, PtpHeader, PtpMessage, PtpMessageType,
    PtpTimestamp,
};
use pnet::util::MacAddr;
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

/// Capture start used by every builder (2023-11-14 22:13:20 UTC).
pub const CAPTURE_BASE_SECS: u64 = 1_700_000_000;

pub fn clock(last: u8) -> ClockIdentity {
    ClockIdentity {
        clock_id: [0x00, 0x1b, 0x19, 0xff, 0xfe, 0x00, 0x00, last],
    }
}

pub fn port(last: u8, port_number: u16) -> PortIdentity {
    PortIdentity {
        clock_identity: clock(last),
        port_number,
    }
}

pub fn mac(last: u8) -> MacAddr {
    MacAddr::new(0x00, 0x1b, 0x19, 0x00, 0x00, last)
}

pub fn multicast_mac() -> MacAddr {
    MacAddr::new(0x01, 0x1b, 0x19, 0x00, 0x00, 0x00)
}

#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message_type: PtpMessageType,
    sequence_id: u16,
    capture_time: Duration,
    source_mac: MacAddr,
    dest_mac: MacAddr,
    source_port: PortIdentity,
    requesting_port: PortIdentity,
    timestamp: PtpTimestamp,
    log_message_interval: i8,
    announce: AnnounceBody,
}

impl MessageBuilder {
    pub fn new(message_type: PtpMessageType) -> Self {
        Self {
            message_type,
            sequence_id: 0,
            capture_time: Duration::from_secs(CAPTURE_BASE_SECS),
            source_mac: mac(1),
            dest_mac: multicast_mac(),
            source_port: port(1, 1),
            requesting_port: port(2, 1),
            timestamp: PtpTimestamp::new(CAPTURE_BASE_SECS, 0),
            log_message_interval: 0,
            announce: AnnounceBody::default(),
        }
    }

    pub fn seq(mut self, sequence_id: u16) -> Self {
        self.sequence_id = sequence_id;
        self
    }

    /// Capture time as an offset from [`CAPTURE_BASE_SECS`].
    pub fn at_nanos(mut self, nanos: u64) -> Self {
        self.capture_time = Duration::from_secs(CAPTURE_BASE_SECS) + Duration::from_nanos(nanos);
        self
    }

    pub fn at_millis(self, millis: u64) -> Self {
        self.at_nanos(millis * 1_000_000)
    }

    pub fn timestamp(mut self, timestamp: PtpTimestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn macs(mut self, source_mac: MacAddr, dest_mac: MacAddr) -> Self {
        self.source_mac = source_mac;
        self.dest_mac = dest_mac;
        self
    }

    pub fn source_port(mut self, source_port: PortIdentity) -> Self {
        self.source_port = source_port;
        self
    }

    pub fn requesting_port(mut self, requesting_port: PortIdentity) -> Self {
        self.requesting_port = requesting_port;
        self
    }

    pub fn log_interval(mut self, log_message_interval: i8) -> Self {
        self.log_message_interval = log_message_interval;
        self
    }

    pub fn announce(mut self, announce: AnnounceBody) -> Self {
        self.announce = announce;
        self
    }

    fn body(&self) -> PtpBody {
        let timestamp = self.timestamp;
        let requesting_port_identity = self.requesting_port;
        match self.message_type {
            PtpMessageType::Sync => PtpBody::Sync {
                origin_timestamp: timestamp,
            },
            PtpMessageType::DelayReq => PtpBody::DelayReq {
                origin_timestamp: timestamp,
            },
            PtpMessageType::PDelayReq => PtpBody::PDelayReq {
                origin_timestamp: timestamp,
            },
            PtpMessageType::FollowUp => PtpBody::FollowUp {
                precise_origin_timestamp: timestamp,
                information: None,
            },
            PtpMessageType::DelayResp => PtpBody::DelayResp {
                receive_timestamp: timestamp,
                requesting_port_identity,
            },
            PtpMessageType::PDelayResp => PtpBody::PDelayResp {
                request_receipt_timestamp: timestamp,
                requesting_port_identity,
            },
            PtpMessageType::PDelayRespFollowUp => PtpBody::PDelayRespFollowUp {
                response_origin_timestamp: timestamp,
                requesting_port_identity,
            },
            PtpMessageType::Announce => PtpBody::Announce(AnnounceBody {
                origin_timestamp: timestamp,
                ..self.announce
            }),
            PtpMessageType::Signaling => PtpBody::Signaling {
                target_port_identity: requesting_port_identity,
            },
            PtpMessageType::Unknown(_) => PtpBody::Unknown,
        }
    }

    pub fn build(&self) -> PtpMessage {
        PtpMessage {
            header: PtpHeader {
                transport_specific: 0,
                message_type: self.message_type,
                version: 2,
                message_length: self.encode().len() as u16,
                domain_number: 0,
                flags: 0,
                correction_field: 0,
                source_port_identity: self.source_port,
                sequence_id: self.sequence_id,
                control_field: 0,
                log_message_interval: self.log_message_interval,
            },
            body: self.body(),
            capture_time: self.capture_time,
            source_mac: self.source_mac,
            dest_mac: self.dest_mac,
        }
    }

    pub fn arc(&self) -> Arc<PtpMessage> {
        Arc::new(self.build())
    }

    /// Wire encoding of the message, header included.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        match self.body() {
            PtpBody::Sync { origin_timestamp }
            | PtpBody::DelayReq { origin_timestamp }
            | PtpBody::PDelayReq { origin_timestamp } => {
                put_timestamp(&mut body, &origin_timestamp);
            }
            PtpBody::FollowUp {
                precise_origin_timestamp,
                ..
            } => put_timestamp(&mut body, &precise_origin_timestamp),
            PtpBody::DelayResp {
                receive_timestamp: timestamp,
                requesting_port_identity,
            }
            | PtpBody::PDelayResp {
                request_receipt_timestamp: timestamp,
                requesting_port_identity,
            }
            | PtpBody::PDelayRespFollowUp {
                response_origin_timestamp: timestamp,
                requesting_port_identity,
            } => {
                put_timestamp(&mut body, &timestamp);
                put_port(&mut body, &requesting_port_identity);
            }
            PtpBody::Announce(announce) => {
                put_timestamp(&mut body, &announce.origin_timestamp);
                body.extend(announce.utc_offset.to_be_bytes());
                body.push(0);
                body.push(announce.priority1);
                body.push(announce.clock_class.0);
                body.push(announce.clock_accuracy.0);
                body.extend(announce.clock_variance.to_be_bytes());
                body.push(announce.priority2);
                body.extend(announce.grandmaster_identity.clock_id);
                body.extend(announce.steps_removed.to_be_bytes());
                body.push(announce.time_source.0);
            }
            PtpBody::Signaling {
                target_port_identity,
            } => put_port(&mut body, &target_port_identity),
            PtpBody::Unknown => {}
        }

        let mut data = Vec::with_capacity(34 + body.len());
        data.push(self.message_type.tag());
        data.push(0x02);
        data.extend(((34 + body.len()) as u16).to_be_bytes());
        data.extend([0u8; 16]); // domain, reserved, flags, correction, reserved
        put_port(&mut data, &self.source_port);
        data.extend(self.sequence_id.to_be_bytes());
        data.push(0);
        data.push(self.log_message_interval as u8);
        data.extend(body);
        data
    }

    pub fn frame(&self) -> RawFrame {
        RawFrame {
            capture_time: self.capture_time,
            source_mac: self.source_mac,
            dest_mac: self.dest_mac,
            vlan_id: None,
            payload: self.encode(),
        }
    }
}

fn put_timestamp(out: &mut Vec<u8>, timestamp: &PtpTimestamp) {
    out.extend(&timestamp.seconds.to_be_bytes()[2..]);
    out.extend(timestamp.nanoseconds.to_be_bytes());
}

fn put_port(out: &mut Vec<u8>, port: &PortIdentity) {
    out.extend(port.clock_identity.clock_id);
    out.extend(port.port_number.to_be_bytes());
}

/// Sync messages at a fixed capture spacing, with matching origin timestamps.
pub fn sync_train(count: usize, interval_nanos: u64) -> Vec<Arc<PtpMessage>> {
    (0..count)
        .map(|i| {
            let offset = i as u64 * interval_nanos;
            MessageBuilder::new(PtpMessageType::Sync)
                .seq(i as u16)
                .at_nanos(offset)
                .timestamp(PtpTimestamp::new(
                    CAPTURE_BASE_SECS + offset / 1_000_000_000,
                    (offset % 1_000_000_000) as u32,
                ))
                .arc()
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Info,
    Debug,
    Warning,
    Error,
}

/// Keeps every line so tests can assert on the rendered narrative.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    pub lines: RefCell<Vec<(Record, String)>>,
}

impl RecordingLogger {
    pub fn count(&self, kind: Record) -> usize {
        self.lines.borrow().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.borrow().iter().any(|(_, line)| line.contains(needle))
    }
}

impl Logger for RecordingLogger {
    fn info(&self, msg: &str) {
        self.lines.borrow_mut().push((Record::Info, msg.to_string()));
    }

    fn debug(&self, msg: &str) {
        self.lines.borrow_mut().push((Record::Debug, msg.to_string()));
    }

    fn warning(&self, msg: &str) {
        self.lines
            .borrow_mut()
            .push((Record::Warning, msg.to_string()));
    }

    fn error(&self, msg: &str) {
        self.lines.borrow_mut().push((Record::Error, msg.to_string()));
    }
}
