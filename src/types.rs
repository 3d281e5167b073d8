use crate::source::RawFrame;
use pnet::util::MacAddr;
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;

pub const HEADER_LEN: usize = 34;
const TIMESTAMP_LEN: usize = 10;
const PORT_IDENTITY_LEN: usize = 10;
const FOLLOW_UP_INFORMATION_LEN: usize = 32;
const ANNOUNCE_BODY_LEN: usize = 30;
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short for PTP header: need {HEADER_LEN} bytes, have {have}")]
    TruncatedHeader { have: usize },
    #[error("frame too short for {message_type} message: need {needed} bytes, have {have}")]
    Truncated {
        message_type: PtpMessageType,
        needed: usize,
        have: usize,
    },
    #[error("unsupported PTP version {0}")]
    UnsupportedVersion(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PtpTimestamp {
    pub seconds: u64,
    pub nanoseconds: u32,
}

impl PtpTimestamp {
    #[cfg(test)]
    pub fn new(seconds: u64, nanoseconds: u32) -> Self {
        Self {
            seconds,
            nanoseconds,
        }
    }

    pub fn total_nanoseconds(&self) -> u128 {
        (self.seconds as u128) * 1_000_000_000u128 + (self.nanoseconds as u128)
    }

    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanoseconds == 0
    }

    /// Distance from `self` to `later` over the nanosecond fields only.
    ///
    /// A negative difference is taken as a single one-second rollover, so the
    /// result is only meaningful for gaps shorter than one second.
    pub fn nanos_delta_wrapping(&self, later: &PtpTimestamp) -> i64 {
        let delta = later.nanoseconds as i64 - self.nanoseconds as i64;
        if delta < 0 {
            delta + NANOS_PER_SEC
        } else {
            delta
        }
    }

    /// Signed distance from `self` to `later` over the full 80-bit value.
    pub fn nanos_until(&self, later: &PtpTimestamp) -> i64 {
        (later.total_nanoseconds() as i128 - self.total_nanoseconds() as i128) as i64
    }

    fn read(b: &[u8]) -> Self {
        Self {
            seconds: u64::from_be_bytes([0, 0, b[0], b[1], b[2], b[3], b[4], b[5]]),
            nanoseconds: u32::from_be_bytes([b[6], b[7], b[8], b[9]]),
        }
    }
}

impl Display for PtpTimestamp {
    /// PTP time counts TAI seconds from 1970-01-01 00:00:00 TAI. Rendered as UTC
    /// with the TAI-UTC offset in effect, when one is known.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }

        let epoch = hifitime::Epoch::from_gregorian_tai_at_midnight(1970, 1, 1)
            + hifitime::Duration::from_total_nanoseconds(self.total_nanoseconds() as i128);
        let (year, month, day, hour, minute, second, nanosecond) = epoch.to_gregorian_utc();

        write!(
            f,
            "{}-{:02}-{:02} {:02}:{:02}:{:02}.{:09} UTC",
            year, month, day, hour, minute, second, nanosecond
        )?;
        if let Some(leap_seconds) = epoch.leap_seconds(true) {
            write!(f, " (TAI-UTC {} s)", leap_seconds)?;
        }
        Ok(())
    }
}

/// Render a capture timestamp (UTC, seconds since the UNIX epoch) as a wall clock time.
pub fn format_capture_time(time: Duration) -> String {
    let (_, _, _, hour, minute, second, nanosecond) = capture_epoch(time).to_gregorian_utc();
    format!("{:02}:{:02}:{:02}.{:09}", hour, minute, second, nanosecond)
}

/// Render a capture timestamp as a full UTC date.
pub fn format_capture_date(time: Duration) -> String {
    let (year, month, day, hour, minute, second, _) = capture_epoch(time).to_gregorian_utc();
    format!(
        "{}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
        year, month, day, hour, minute, second
    )
}

fn capture_epoch(time: Duration) -> hifitime::Epoch {
    hifitime::Epoch::from_unix_duration(hifitime::Duration::from_total_nanoseconds(
        time.as_nanos() as i128,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PtpMessageType {
    Sync,
    DelayReq,
    PDelayReq,
    PDelayResp,
    FollowUp,
    DelayResp,
    PDelayRespFollowUp,
    Announce,
    Signaling,
    Unknown(u8),
}

impl PtpMessageType {
    /// Resolve the low nibble of the first header byte. Tags this tool does not
    /// analyse (management, reserved values) map to `Unknown`.
    pub fn from_nibble(value: u8) -> Self {
        match value & 0x0f {
            0x0 => PtpMessageType::Sync,
            0x1 => PtpMessageType::DelayReq,
            0x2 => PtpMessageType::PDelayReq,
            0x3 => PtpMessageType::PDelayResp,
            0x8 => PtpMessageType::FollowUp,
            0x9 => PtpMessageType::DelayResp,
            0xa => PtpMessageType::PDelayRespFollowUp,
            0xb => PtpMessageType::Announce,
            0xc => PtpMessageType::Signaling,
            other => PtpMessageType::Unknown(other),
        }
    }

    #[cfg(test)]
    pub fn tag(&self) -> u8 {
        match self {
            PtpMessageType::Sync => 0x0,
            PtpMessageType::DelayReq => 0x1,
            PtpMessageType::PDelayReq => 0x2,
            PtpMessageType::PDelayResp => 0x3,
            PtpMessageType::FollowUp => 0x8,
            PtpMessageType::DelayResp => 0x9,
            PtpMessageType::PDelayRespFollowUp => 0xa,
            PtpMessageType::Announce => 0xb,
            PtpMessageType::Signaling => 0xc,
            PtpMessageType::Unknown(tag) => *tag,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, PtpMessageType::DelayReq | PtpMessageType::PDelayReq)
    }

    pub fn is_response(&self) -> bool {
        matches!(self, PtpMessageType::DelayResp | PtpMessageType::PDelayResp)
    }

    /// Body length required beyond the common header.
    fn body_len(&self) -> usize {
        match self {
            PtpMessageType::Sync
            | PtpMessageType::DelayReq
            | PtpMessageType::PDelayReq
            | PtpMessageType::FollowUp => TIMESTAMP_LEN,
            PtpMessageType::DelayResp
            | PtpMessageType::PDelayResp
            | PtpMessageType::PDelayRespFollowUp => TIMESTAMP_LEN + PORT_IDENTITY_LEN,
            PtpMessageType::Announce => ANNOUNCE_BODY_LEN,
            PtpMessageType::Signaling => PORT_IDENTITY_LEN,
            PtpMessageType::Unknown(_) => 0,
        }
    }
}

impl Display for PtpMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PtpMessageType::Sync => write!(f, "SYNC"),
            PtpMessageType::DelayReq => write!(f, "DELAY_REQ"),
            PtpMessageType::PDelayReq => write!(f, "PDELAY_REQ"),
            PtpMessageType::PDelayResp => write!(f, "PDELAY_RESP"),
            PtpMessageType::FollowUp => write!(f, "FOLLOW_UP"),
            PtpMessageType::DelayResp => write!(f, "DELAY_RESP"),
            PtpMessageType::PDelayRespFollowUp => write!(f, "PDELAY_RESP_FU"),
            PtpMessageType::Announce => write!(f, "ANNOUNCE"),
            PtpMessageType::Signaling => write!(f, "SIGNALING"),
            PtpMessageType::Unknown(tag) => write!(f, "UNKNOWN(0x{:x})", tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy, Ord, PartialOrd, Default)]
pub struct ClockIdentity {
    pub clock_id: [u8; 8],
}

impl ClockIdentity {
    /// The MAC address an EUI-64 clock identity was derived from. Octets 3 and 4
    /// are the `ff:fe` filler and carry no information.
    pub fn eui48(&self) -> MacAddr {
        let b = &self.clock_id;
        MacAddr::new(b[0], b[1], b[2], b[5], b[6], b[7])
    }

    fn read(b: &[u8]) -> Self {
        let mut clock_id = [0u8; 8];
        clock_id.copy_from_slice(&b[..8]);
        Self { clock_id }
    }
}

impl Display for ClockIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.clock_id;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy, Ord, PartialOrd, Default)]
pub struct PortIdentity {
    pub clock_identity: ClockIdentity,
    pub port_number: u16,
}

impl PortIdentity {
    fn read(b: &[u8]) -> Self {
        Self {
            clock_identity: ClockIdentity::read(&b[0..8]),
            port_number: u16::from_be_bytes([b[8], b[9]]),
        }
    }
}

impl Display for PortIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.clock_identity.eui48(), self.port_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockClass(pub u8);

impl Display for ClockClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = match self.0 {
            6 => "Primary reference",
            7 => "Primary reference (holdover)",
            13 => "Application specific",
            14 => "Application specific (holdover)",
            52 | 187 => "Primary reference (degraded)",
            58 | 193 => "Application specific (degraded)",
            68..=122 | 133..=170 | 216..=232 => "Alternate PTP profile",
            248 => "Default, free-running",
            255 => "Follower-only",
            _ => "Reserved",
        };
        write!(f, "{} ({})", self.0, description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockAccuracy(pub u8);

impl ClockAccuracy {
    pub const UNKNOWN: ClockAccuracy = ClockAccuracy(0xfe);

    pub fn description(&self) -> &'static str {
        match self.0 {
            0x20 => "25 ns",
            0x21 => "100 ns",
            0x22 => "250 ns",
            0x23 => "1 µs",
            0x24 => "2.5 µs",
            0x25 => "10 µs",
            0x26 => "25 µs",
            0x27 => "100 µs",
            0x28 => "250 µs",
            0x29 => "1 ms",
            0x2a => "2.5 ms",
            0x2b => "10 ms",
            0x2c => "25 ms",
            0x2d => "100 ms",
            0x2e => "250 ms",
            0x2f => "1 s",
            0x30 => "10 s",
            0x31 => "> 10 s",
            0x80..=0xfd => "Alternate PTP profile",
            0xfe => "Unknown",
            _ => "Reserved",
        }
    }
}

impl Default for ClockAccuracy {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl Display for ClockAccuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02x} ({})", self.0, self.description())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeSource(pub u8);

impl TimeSource {
    pub fn description(&self) -> &'static str {
        match self.0 {
            0x10 => "Atomic clock",
            0x20 => "GPS",
            0x30 => "Terrestrial radio",
            0x40 => "PTP",
            0x50 => "NTP",
            0x60 => "Hand set",
            0x90 => "Other",
            0xa0 => "Internal oscillator",
            _ => "Unknown",
        }
    }
}

impl Display for TimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02x} ({})", self.0, self.description())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtpHeader {
    pub transport_specific: u8,
    pub message_type: PtpMessageType,
    pub version: u8,
    pub message_length: u16,
    pub domain_number: u8,
    pub flags: u16,
    pub correction_field: i64,
    pub source_port_identity: PortIdentity,
    pub sequence_id: u16,
    pub control_field: u8,
    pub log_message_interval: i8,
}

impl TryFrom<&[u8]> for PtpHeader {
    type Error = DecodeError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::TruncatedHeader { have: data.len() });
        }

        let version = data[1] & 0x0f;
        if version != 2 {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        Ok(PtpHeader {
            transport_specific: data[0] >> 4,
            message_type: PtpMessageType::from_nibble(data[0]),
            version,
            message_length: u16::from_be_bytes([data[2], data[3]]),
            domain_number: data[4],
            flags: u16::from_be_bytes([data[6], data[7]]),
            correction_field: i64::from_be_bytes([
                data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
            ]),
            source_port_identity: PortIdentity::read(&data[20..30]),
            sequence_id: u16::from_be_bytes([data[30], data[31]]),
            control_field: data[32],
            log_message_interval: data[33] as i8,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnnounceBody {
    pub origin_timestamp: PtpTimestamp,
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

impl AnnounceBody {
    fn read(b: &[u8]) -> Self {
        // b[12] is reserved
        Self {
            origin_timestamp: PtpTimestamp::read(&b[0..10]),
            utc_offset: i16::from_be_bytes([b[10], b[11]]),
            priority1: b[13],
            clock_class: ClockClass(b[14]),
            clock_accuracy: ClockAccuracy(b[15]),
            clock_variance: u16::from_be_bytes([b[16], b[17]]),
            priority2: b[18],
            grandmaster_identity: ClockIdentity::read(&b[19..27]),
            steps_removed: u16::from_be_bytes([b[27], b[28]]),
            time_source: TimeSource(b[29]),
        }
    }
}

/// Variant-specific part of a PTP message, selected by the header's message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtpBody {
    Sync {
        origin_timestamp: PtpTimestamp,
    },
    DelayReq {
        origin_timestamp: PtpTimestamp,
    },
    PDelayReq {
        origin_timestamp: PtpTimestamp,
    },
    FollowUp {
        precise_origin_timestamp: PtpTimestamp,
        information: Option<[u8; FOLLOW_UP_INFORMATION_LEN]>,
    },
    DelayResp {
        receive_timestamp: PtpTimestamp,
        requesting_port_identity: PortIdentity,
    },
    PDelayResp {
        request_receipt_timestamp: PtpTimestamp,
        requesting_port_identity: PortIdentity,
    },
    PDelayRespFollowUp {
        response_origin_timestamp: PtpTimestamp,
        requesting_port_identity: PortIdentity,
    },
    Announce(AnnounceBody),
    Signaling {
        target_port_identity: PortIdentity,
    },
    Unknown,
}

impl PtpBody {
    /// Decode the body that follows `header` in `data` (which still includes the header).
    pub fn decode(header: &PtpHeader, data: &[u8]) -> Result<Self, DecodeError> {
        let needed = HEADER_LEN + header.message_type.body_len();
        if data.len() < needed {
            return Err(DecodeError::Truncated {
                message_type: header.message_type,
                needed,
                have: data.len(),
            });
        }

        let b = &data[HEADER_LEN..];
        let body = match header.message_type {
            PtpMessageType::Sync => PtpBody::Sync {
                origin_timestamp: PtpTimestamp::read(b),
            },
            PtpMessageType::DelayReq => PtpBody::DelayReq {
                origin_timestamp: PtpTimestamp::read(b),
            },
            PtpMessageType::PDelayReq => PtpBody::PDelayReq {
                origin_timestamp: PtpTimestamp::read(b),
            },
            PtpMessageType::FollowUp => {
                let information = b
                    .get(TIMESTAMP_LEN..TIMESTAMP_LEN + FOLLOW_UP_INFORMATION_LEN)
                    .map(|tlv| {
                        let mut block = [0u8; FOLLOW_UP_INFORMATION_LEN];
                        block.copy_from_slice(tlv);
                        block
                    });
                PtpBody::FollowUp {
                    precise_origin_timestamp: PtpTimestamp::read(b),
                    information,
                }
            }
            PtpMessageType::DelayResp => PtpBody::DelayResp {
                receive_timestamp: PtpTimestamp::read(b),
                requesting_port_identity: PortIdentity::read(&b[10..20]),
            },
            PtpMessageType::PDelayResp => PtpBody::PDelayResp {
                request_receipt_timestamp: PtpTimestamp::read(b),
                requesting_port_identity: PortIdentity::read(&b[10..20]),
            },
            PtpMessageType::PDelayRespFollowUp => PtpBody::PDelayRespFollowUp {
                response_origin_timestamp: PtpTimestamp::read(b),
                requesting_port_identity: PortIdentity::read(&b[10..20]),
            },
            PtpMessageType::Announce => PtpBody::Announce(AnnounceBody::read(b)),
            PtpMessageType::Signaling => PtpBody::Signaling {
                target_port_identity: PortIdentity::read(b),
            },
            PtpMessageType::Unknown(_) => PtpBody::Unknown,
        };

        Ok(body)
    }
}

/// One decoded PTP frame together with its capture metadata. Never mutated
/// after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct PtpMessage {
    pub header: PtpHeader,
    pub body: PtpBody,
    pub capture_time: Duration,
    pub source_mac: MacAddr,
    pub dest_mac: MacAddr,
}

impl PtpMessage {
    pub fn message_type(&self) -> PtpMessageType {
        self.header.message_type
    }

    pub fn sequence_id(&self) -> u16 {
        self.header.sequence_id
    }

    pub fn source_port_identity(&self) -> PortIdentity {
        self.header.source_port_identity
    }

    pub fn requesting_port_identity(&self) -> Option<PortIdentity> {
        match self.body {
            PtpBody::DelayResp {
                requesting_port_identity,
                ..
            }
            | PtpBody::PDelayResp {
                requesting_port_identity,
                ..
            }
            | PtpBody::PDelayRespFollowUp {
                requesting_port_identity,
                ..
            } => Some(requesting_port_identity),
            _ => None,
        }
    }

    pub fn origin_timestamp(&self) -> Option<PtpTimestamp> {
        match self.body {
            PtpBody::Sync { origin_timestamp }
            | PtpBody::DelayReq { origin_timestamp }
            | PtpBody::PDelayReq { origin_timestamp } => Some(origin_timestamp),
            PtpBody::Announce(announce) => Some(announce.origin_timestamp),
            _ => None,
        }
    }

    pub fn precise_origin_timestamp(&self) -> Option<PtpTimestamp> {
        match self.body {
            PtpBody::FollowUp {
                precise_origin_timestamp,
                ..
            } => Some(precise_origin_timestamp),
            _ => None,
        }
    }

    /// T4: `receiveTimestamp` of a DelayResp or `requestReceiptTimestamp` of a PDelayResp.
    pub fn receipt_timestamp(&self) -> Option<PtpTimestamp> {
        match self.body {
            PtpBody::DelayResp {
                receive_timestamp, ..
            } => Some(receive_timestamp),
            PtpBody::PDelayResp {
                request_receipt_timestamp,
                ..
            } => Some(request_receipt_timestamp),
            _ => None,
        }
    }

    /// Whichever timestamp the body carries.
    pub fn timestamp(&self) -> Option<PtpTimestamp> {
        match self.body {
            PtpBody::PDelayRespFollowUp {
                response_origin_timestamp,
                ..
            } => Some(response_origin_timestamp),
            _ => self
                .origin_timestamp()
                .or_else(|| self.precise_origin_timestamp())
                .or_else(|| self.receipt_timestamp()),
        }
    }

    pub fn announce(&self) -> Option<&AnnounceBody> {
        match &self.body {
            PtpBody::Announce(announce) => Some(announce),
            _ => None,
        }
    }

    pub fn capture_nanos(&self) -> i128 {
        self.capture_time.as_nanos() as i128
    }

    /// Seconds elapsed between `time_offset` and this message's capture.
    pub fn capture_offset(&self, time_offset: Duration) -> f64 {
        (self.capture_nanos() - time_offset.as_nanos() as i128) as f64 / NANOS_PER_SEC as f64
    }
}

impl TryFrom<&RawFrame> for PtpMessage {
    type Error = DecodeError;

    fn try_from(frame: &RawFrame) -> Result<Self, Self::Error> {
        let header = PtpHeader::try_from(frame.payload.as_slice())?;
        let body = PtpBody::decode(&header, &frame.payload)?;

        Ok(PtpMessage {
            header,
            body,
            capture_time: frame.capture_time,
            source_mac: frame.source_mac,
            dest_mac: frame.dest_mac,
        })
    }
}

#[test]
fn test_ptp_header_parsing() {
    let header_data = [
        0x10, 0x02, 0x00, 0x2C, 0x00, 0x02, 0x02, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1B, 0x19, 0xFF, 0xFE, 0x12, 0x34, 0x56, 0x00, 0x01,
        0x00, 0x64, 0x00, 0xFD,
    ];

    let header = PtpHeader::try_from(&header_data[..]).unwrap();

    assert_eq!(header.transport_specific, 1);
    assert_eq!(header.message_type, PtpMessageType::Sync);
    assert_eq!(header.version, 2);
    assert_eq!(header.message_length, 44);
    assert_eq!(header.flags, 0x0208);
    assert_eq!(header.correction_field, 0x1_0000);
    assert_eq!(header.sequence_id, 100);
    assert_eq!(header.log_message_interval, -3);
    assert_eq!(
        header.source_port_identity.to_string(),
        "00:1b:19:12:34:56/1"
    );
}

#[test]
fn test_ptp_header_parsing_errors() {
    let short_data = [0u8; 33];
    assert_eq!(
        PtpHeader::try_from(&short_data[..]),
        Err(DecodeError::TruncatedHeader { have: 33 })
    );

    let mut invalid_ver_data = [0u8; 34];
    invalid_ver_data[1] = 0x03;
    assert_eq!(
        PtpHeader::try_from(&invalid_ver_data[..]),
        Err(DecodeError::UnsupportedVersion(3))
    );
}

#[test]
fn test_unknown_tags_are_not_errors() {
    let mut management = [0u8; 34];
    management[0] = 0x0d;
    management[1] = 0x02;

    let header = PtpHeader::try_from(&management[..]).unwrap();
    assert_eq!(header.message_type, PtpMessageType::Unknown(0xd));
    assert_eq!(
        PtpBody::decode(&header, &management).unwrap(),
        PtpBody::Unknown
    );
}

#[test]
fn test_sync_message_parsing() {
    let msg_data = [
        0x00, 0x02, 0x00, 0x2C, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1B, 0x19, 0xFF, 0xFE, 0x11, 0x22, 0x33, 0x00, 0x01,
        0x00, 0x7B, 0x00, 0xFF, 0x00, 0x00, 0x3B, 0x9A, 0xCA, 0x00, 0x1D, 0xCD, 0x65, 0x00,
    ];

    let header = PtpHeader::try_from(&msg_data[..]).unwrap();
    let body = PtpBody::decode(&header, &msg_data).unwrap();

    assert_eq!(header.sequence_id, 123);
    assert_eq!(header.log_message_interval, -1);
    assert_eq!(
        body,
        PtpBody::Sync {
            origin_timestamp: PtpTimestamp::new(1_000_000_000, 500_000_000)
        }
    );
}

#[test]
fn test_followup_information_block_is_optional() {
    let mut msg_data = vec![
        0x08, 0x02, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1B, 0x19, 0xFF, 0xFE, 0x44, 0x55, 0x66, 0x00, 0x01,
        0x00, 0x7B, 0x02, 0xFF, 0x00, 0x00, 0x3B, 0x9A, 0xCA, 0x00, 0x1D, 0xCD, 0x65, 0x01,
    ];

    let header = PtpHeader::try_from(&msg_data[..]).unwrap();
    match PtpBody::decode(&header, &msg_data).unwrap() {
        PtpBody::FollowUp {
            precise_origin_timestamp,
            information,
        } => {
            assert_eq!(precise_origin_timestamp.nanoseconds, 500_000_001);
            assert!(information.is_none());
        }
        other => panic!("unexpected body {:?}", other),
    }

    msg_data.extend(std::iter::repeat_n(0xAB, 32));
    match PtpBody::decode(&header, &msg_data).unwrap() {
        PtpBody::FollowUp { information, .. } => assert_eq!(information, Some([0xAB; 32])),
        other => panic!("unexpected body {:?}", other),
    }
}

#[cfg(test)]
fn wire_frame(payload: Vec<u8>) -> RawFrame {
    RawFrame {
        capture_time: Duration::from_secs(1_700_000_000),
        source_mac: MacAddr::new(0x00, 0x1b, 0x19, 0x11, 0x22, 0x33),
        dest_mac: MacAddr::new(0x01, 0x1b, 0x19, 0x00, 0x00, 0x00),
        vlan_id: None,
        payload,
    }
}

#[test]
fn test_delay_resp_decode() {
    let msg_data = vec![
        0x09, 0x02, 0x00, 0x36, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1B, 0x19, 0xFF, 0xFE, 0x11, 0x22, 0x33, 0x00, 0x01,
        0x00, 0x07, 0x03, 0x00, 0x00, 0x00, 0x65, 0x53, 0xF1, 0x00, 0x00, 0x00, 0x03, 0xE8, 0x00,
        0x1B, 0x19, 0xFF, 0xFE, 0x44, 0x55, 0x66, 0x00, 0x02,
    ];

    let message = PtpMessage::try_from(&wire_frame(msg_data)).unwrap();
    assert_eq!(message.message_type(), PtpMessageType::DelayResp);
    assert_eq!(message.sequence_id(), 7);
    assert_eq!(
        message.receipt_timestamp(),
        Some(PtpTimestamp::new(1_700_000_000, 1_000))
    );
    assert_eq!(message.timestamp(), message.receipt_timestamp());
    assert_eq!(message.origin_timestamp(), None);
    assert_eq!(
        message.requesting_port_identity().map(|p| p.to_string()),
        Some("00:1b:19:44:55:66/2".to_string())
    );
}

#[test]
fn test_signaling_decode() {
    let msg_data = vec![
        0x0C, 0x02, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1B, 0x19, 0xFF, 0xFE, 0x11, 0x22, 0x33, 0x00, 0x01,
        0x01, 0x00, 0x05, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    ];

    let message = PtpMessage::try_from(&wire_frame(msg_data)).unwrap();
    assert_eq!(message.message_type(), PtpMessageType::Signaling);
    assert_eq!(message.sequence_id(), 256);
    assert_eq!(
        message.body,
        PtpBody::Signaling {
            target_port_identity: PortIdentity {
                clock_identity: ClockIdentity { clock_id: [0xFF; 8] },
                port_number: 0xFFFF,
            }
        }
    );
    assert_eq!(message.requesting_port_identity(), None);
    assert_eq!(message.timestamp(), None);
}

#[test]
fn test_peer_delay_response_decode() {
    use crate::testutil::{MessageBuilder, port};

    let receipt = PtpTimestamp::new(1_700_000_001, 250);
    let response = MessageBuilder::new(PtpMessageType::PDelayResp)
        .seq(42)
        .timestamp(receipt)
        .requesting_port(port(7, 3))
        .frame();
    let message = PtpMessage::try_from(&response).unwrap();
    assert_eq!(message.message_type(), PtpMessageType::PDelayResp);
    assert!(message.message_type().is_response());
    assert_eq!(message.sequence_id(), 42);
    assert_eq!(message.receipt_timestamp(), Some(receipt));
    assert_eq!(message.requesting_port_identity(), Some(port(7, 3)));

    let origin = PtpTimestamp::new(1_700_000_001, 900);
    let follow_up = MessageBuilder::new(PtpMessageType::PDelayRespFollowUp)
        .seq(42)
        .timestamp(origin)
        .requesting_port(port(7, 3))
        .frame();
    assert_eq!(follow_up.payload.len(), HEADER_LEN + 20);
    let message = PtpMessage::try_from(&follow_up).unwrap();
    assert_eq!(message.message_type(), PtpMessageType::PDelayRespFollowUp);
    assert!(!message.message_type().is_response());
    assert_eq!(message.receipt_timestamp(), None);
    assert_eq!(message.timestamp(), Some(origin));
    assert_eq!(message.requesting_port_identity(), Some(port(7, 3)));
}

#[test]
fn test_truncated_bodies() {
    let mut delay_resp = [0u8; 50];
    delay_resp[0] = 0x09;
    delay_resp[1] = 0x02;

    let header = PtpHeader::try_from(&delay_resp[..]).unwrap();
    assert_eq!(
        PtpBody::decode(&header, &delay_resp),
        Err(DecodeError::Truncated {
            message_type: PtpMessageType::DelayResp,
            needed: 54,
            have: 50,
        })
    );

    let mut announce = [0u8; 63];
    announce[0] = 0x0b;
    announce[1] = 0x02;
    let header = PtpHeader::try_from(&announce[..]).unwrap();
    assert!(PtpBody::decode(&header, &announce).is_err());
}

#[test]
fn test_timestamp_nanos_delta_wraps_once() {
    let before = PtpTimestamp::new(10, 900_000_000);
    let after = PtpTimestamp::new(11, 25_000_000);
    assert_eq!(before.nanos_delta_wrapping(&after), 125_000_000);
    assert_eq!(after.nanos_delta_wrapping(&before), 875_000_000);

    assert_eq!(before.nanos_until(&after), 125_000_000);
    assert_eq!(after.nanos_until(&before), -125_000_000);
    assert_eq!(
        PtpTimestamp::new(10, 0).nanos_until(&PtpTimestamp::new(11, 0)),
        1_000_000_000
    );
}

#[test]
fn test_timestamp_display() {
    assert_eq!(PtpTimestamp::default().to_string(), "0");
    assert_eq!(
        PtpTimestamp::new(1_700_000_037, 5).to_string(),
        "2023-11-14 22:13:20.000000005 UTC (TAI-UTC 37 s)"
    );
}

#[test]
fn test_descriptions() {
    assert_eq!(ClockAccuracy(0x21).to_string(), "0x21 (100 ns)");
    assert_eq!(ClockAccuracy::default(), ClockAccuracy::UNKNOWN);
    assert_eq!(TimeSource(0x20).to_string(), "0x20 (GPS)");
    assert_eq!(ClockClass(6).to_string(), "6 (Primary reference)");
    assert_eq!(
        format_capture_time(Duration::new(1_700_000_000, 5)),
        "22:13:20.000000005"
    );
    assert_eq!(
        format_capture_date(Duration::new(1_700_000_000, 0)),
        "2023-11-14 22:13:20 UTC"
    );
}
