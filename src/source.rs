//! Capture file ingestion for PTP and gPTP traffic
//!
//! Reads pcapng (or legacy pcap) files with `pcap-file` and decodes the link
//! layer with `pnet`. Both PTP over Ethernet (EtherType 0x88F7) and PTP over
//! UDP (ports 319/320) are extracted; everything else is ignored.

use anyhow::{Context, Result};
use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::udp::UdpPacket;
use pcap_file::pcapng::blocks::interface_description::{
    InterfaceDescriptionBlock, InterfaceDescriptionOption,
};
use pnet::util::MacAddr;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const PTP_EVENT_PORT: u16 = 319;
const PTP_GENERAL_PORT: u16 = 320;
/// PTP over IEEE 802.3 / Ethernet
const PTP_ETHERTYPE: u16 = 0x88f7;
const VLAN_TAG_LEN: usize = 4;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// One captured frame that carries a PTP payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Capture time since the UNIX epoch.
    pub capture_time: Duration,
    pub source_mac: MacAddr,
    pub dest_mac: MacAddr,
    pub vlan_id: Option<u16>,
    pub payload: Vec<u8>,
}

/// Strip the link layer from one captured frame. Returns `None` for anything
/// that is not PTP.
pub fn extract_ptp_frame(packet_data: &[u8], capture_time: Duration) -> Option<RawFrame> {
    let ethernet = EthernetPacket::new(packet_data)?;

    let mut vlan_id: Option<u16> = None;
    let mut payload_data = ethernet.payload();
    let mut ethertype = ethernet.get_ethertype();

    // 802.1Q, and 802.1ad QinQ with the outer tag kept as the VLAN id
    for _ in 0..2 {
        if ethertype != EtherTypes::Vlan && ethertype != EtherTypes::QinQ {
            break;
        }
        if payload_data.len() < VLAN_TAG_LEN {
            return None;
        }
        let tag = u16::from_be_bytes([payload_data[0], payload_data[1]]) & 0x0fff;
        vlan_id.get_or_insert(tag);
        ethertype = EtherType(u16::from_be_bytes([payload_data[2], payload_data[3]]));
        payload_data = &payload_data[VLAN_TAG_LEN..];
    }

    let payload = if ethertype.0 == PTP_ETHERTYPE {
        payload_data.to_vec()
    } else if ethertype == EtherTypes::Ipv4 {
        let ipv4_packet = Ipv4Packet::new(payload_data)?;
        if ipv4_packet.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
            return None;
        }

        let udp_packet = UdpPacket::new(ipv4_packet.payload())?;
        let dest_port = udp_packet.get_destination();
        if dest_port != PTP_EVENT_PORT && dest_port != PTP_GENERAL_PORT {
            return None;
        }

        udp_packet.payload().to_vec()
    } else {
        return None;
    };

    Some(RawFrame {
        capture_time,
        source_mac: ethernet.get_source(),
        dest_mac: ethernet.get_destination(),
        vlan_id,
        payload,
    })
}

/// Timestamp unit and epoch offset of one pcapng interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InterfaceClock {
    /// Raw `if_tsresol`: 10^-n seconds per tick, or 2^-n with the high bit set.
    resolution: u8,
    /// `if_tsoffset` in seconds.
    offset_secs: u64,
}

impl Default for InterfaceClock {
    fn default() -> Self {
        // Microseconds unless the interface says otherwise
        Self {
            resolution: 6,
            offset_secs: 0,
        }
    }
}

impl InterfaceClock {
    fn of(interface: &InterfaceDescriptionBlock) -> Self {
        let mut clock = Self::default();
        for option in &interface.options {
            match option {
                InterfaceDescriptionOption::IfTsResol(resolution) => clock.resolution = *resolution,
                InterfaceDescriptionOption::IfTsOffset(offset) => clock.offset_secs = *offset,
                _ => {}
            }
        }
        clock
    }

    fn capture_time(&self, ticks: u128) -> Duration {
        let nanos = if self.resolution & 0x80 != 0 {
            let shift = u32::from(self.resolution & 0x7f);
            (ticks * NANOS_PER_SEC) >> shift
        } else {
            let exponent = u32::from(self.resolution);
            if exponent <= 9 {
                ticks * 10u128.pow(9 - exponent)
            } else {
                ticks / 10u128.pow((exponent - 9).min(38))
            }
        };

        Duration::new(
            self.offset_secs.saturating_add((nanos / NANOS_PER_SEC) as u64),
            (nanos % NANOS_PER_SEC) as u32,
        )
    }
}

/// Load every PTP frame from a capture file, in capture order.
pub fn read_capture(path: &Path) -> Result<Vec<RawFrame>> {
    use pcap_file::pcap::PcapReader;
    use pcap_file::pcapng::{Block, PcapNgReader};

    let mut frames: Vec<RawFrame> = Vec::new();
    let mut skipped = 0usize;

    let file =
        File::open(path).with_context(|| format!("failed to open capture {}", path.display()))?;

    // Try to read as PCAPNG first, then as regular PCAP
    if let Ok(mut pcapng_reader) = PcapNgReader::new(file) {
        debug!("Reading {} as PCAPNG", path.display());

        while let Some(block) = pcapng_reader.next_block() {
            // Raw tick count; pcap-file does not apply the interface resolution
            let (interface_id, ticks, frame) = match block {
                Ok(Block::EnhancedPacket(epb)) => (
                    epb.interface_id,
                    epb.timestamp.as_nanos(),
                    extract_ptp_frame(&epb.data, Duration::ZERO),
                ),
                Ok(Block::SimplePacket(_)) => {
                    warn!("Skipping PCAPNG simple packet block without capture timestamp");
                    skipped += 1;
                    continue;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!("Error reading PCAPNG block: {}", e);
                    break;
                }
            };

            let Some(mut frame) = frame else {
                skipped += 1;
                continue;
            };
            let clock = match pcapng_reader.interfaces().get(interface_id as usize) {
                Some(interface) => InterfaceClock::of(interface),
                None => {
                    warn!("Packet refers to unknown interface {}", interface_id);
                    InterfaceClock::default()
                }
            };
            frame.capture_time = clock.capture_time(ticks);
            frames.push(frame);
        }
    } else {
        debug!("Not a PCAPNG file, trying legacy PCAP format");

        let file = File::open(path)
            .with_context(|| format!("failed to open capture {}", path.display()))?;
        let mut pcap_reader = PcapReader::new(file)
            .with_context(|| format!("{} is neither PCAPNG nor PCAP", path.display()))?;

        while let Some(pkt) = pcap_reader.next_packet() {
            match pkt {
                Ok(packet) => match extract_ptp_frame(&packet.data, packet.timestamp) {
                    Some(frame) => frames.push(frame),
                    None => skipped += 1,
                },
                Err(e) => {
                    warn!("Error reading PCAP packet: {}", e);
                    break;
                }
            }
        }
    }

    info!(
        "Loaded {} PTP frames from {} ({} non-PTP frames ignored)",
        frames.len(),
        path.display(),
        skipped
    );

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MessageBuilder;
    use crate::types::PtpMessageType;
    use pcap_file::DataLink;
    use pcap_file::pcapng::blocks::enhanced_packet::EnhancedPacketBlock;
    use pcap_file::pcapng::{PcapNgBlock, PcapNgWriter};
    use std::borrow::Cow;
    use tempfile::NamedTempFile;

    fn ethernet_header(ethertype: u16) -> Vec<u8> {
        let mut frame = vec![0x01, 0x1b, 0x19, 0x00, 0x00, 0x00];
        frame.extend([0x00, 0x1b, 0x19, 0x12, 0x34, 0x56]);
        frame.extend(ethertype.to_be_bytes());
        frame
    }

    #[test]
    fn extracts_layer2_ptp() {
        let mut frame = ethernet_header(PTP_ETHERTYPE);
        frame.extend([0xAA; 44]);

        let raw = extract_ptp_frame(&frame, Duration::from_secs(5)).unwrap();
        assert_eq!(raw.payload, vec![0xAA; 44]);
        assert_eq!(raw.source_mac, MacAddr::new(0x00, 0x1b, 0x19, 0x12, 0x34, 0x56));
        assert_eq!(raw.dest_mac, MacAddr::new(0x01, 0x1b, 0x19, 0x00, 0x00, 0x00));
        assert_eq!(raw.capture_time, Duration::from_secs(5));
        assert_eq!(raw.vlan_id, None);
    }

    #[test]
    fn extracts_vlan_tagged_ptp() {
        let mut frame = ethernet_header(0x8100);
        frame.extend([0x20, 0x64]); // PCP 1, VID 100
        frame.extend(PTP_ETHERTYPE.to_be_bytes());
        frame.extend([0xBB; 44]);

        let raw = extract_ptp_frame(&frame, Duration::ZERO).unwrap();
        assert_eq!(raw.vlan_id, Some(100));
        assert_eq!(raw.payload.len(), 44);
    }

    #[test]
    fn extracts_udp_ptp_and_ignores_other_ports() {
        let ptp = [0xCC; 44];
        let build = |dest_port: u16| {
            let mut frame = ethernet_header(0x0800);
            let total_len = (20 + 8 + ptp.len()) as u16;
            frame.extend([0x45, 0x00]);
            frame.extend(total_len.to_be_bytes());
            frame.extend([0x00, 0x00, 0x00, 0x00, 0x01, 0x11, 0x00, 0x00]);
            frame.extend([192, 168, 1, 10, 224, 0, 1, 129]);
            frame.extend(PTP_EVENT_PORT.to_be_bytes());
            frame.extend(dest_port.to_be_bytes());
            frame.extend(((8 + ptp.len()) as u16).to_be_bytes());
            frame.extend([0x00, 0x00]);
            frame.extend(ptp);
            frame
        };

        let raw = extract_ptp_frame(&build(PTP_EVENT_PORT), Duration::ZERO).unwrap();
        assert_eq!(raw.payload, ptp.to_vec());
        assert!(extract_ptp_frame(&build(PTP_GENERAL_PORT), Duration::ZERO).is_some());
        assert!(extract_ptp_frame(&build(53), Duration::ZERO).is_none());
    }

    #[test]
    fn ignores_non_ptp_ethertypes() {
        let mut frame = ethernet_header(0x86dd);
        frame.extend([0u8; 60]);
        assert!(extract_ptp_frame(&frame, Duration::ZERO).is_none());
    }

    fn ptp_ethernet_frame(seq: u16) -> Vec<u8> {
        let mut frame = ethernet_header(PTP_ETHERTYPE);
        frame.extend(
            MessageBuilder::new(PtpMessageType::Sync)
                .seq(seq)
                .encode(),
        );
        frame
    }

    /// pcapng with one Ethernet interface and one PTP Sync per tick value.
    fn write_pcapng(options: Vec<InterfaceDescriptionOption<'static>>, ticks: &[u64]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        {
            let mut writer = PcapNgWriter::new(file.as_file_mut()).unwrap();

            let interface = InterfaceDescriptionBlock {
                linktype: DataLink::ETHERNET,
                snaplen: 0xffff,
                options,
            };
            writer.write_block(&interface.into_block()).unwrap();

            for (seq, tick) in ticks.iter().enumerate() {
                let data = ptp_ethernet_frame(seq as u16);
                let packet = EnhancedPacketBlock {
                    interface_id: 0,
                    // pcap-file writes the nanosecond count verbatim as the tick count
                    timestamp: Duration::from_nanos(*tick),
                    original_len: data.len() as u32,
                    data: Cow::Owned(data),
                    options: vec![],
                };
                writer.write_block(&packet.into_block()).unwrap();
            }
        }

        file
    }

    #[test]
    fn pcapng_default_resolution_is_microseconds() {
        let base_us = 1_700_000_000_000_000u64;
        let file = write_pcapng(vec![], &[base_us, base_us + 125_000]);

        let frames = read_capture(file.path()).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].capture_time, Duration::from_secs(1_700_000_000));
        assert_eq!(
            frames[1].capture_time - frames[0].capture_time,
            Duration::from_millis(125)
        );
    }

    #[test]
    fn pcapng_nanosecond_resolution_and_offset() {
        let file = write_pcapng(
            vec![
                InterfaceDescriptionOption::IfTsResol(9),
                InterfaceDescriptionOption::IfTsOffset(1_000),
            ],
            &[5_000_000_007],
        );

        let frames = read_capture(file.path()).unwrap();
        assert_eq!(frames[0].capture_time, Duration::new(1_005, 7));
    }

    #[test]
    fn binary_tick_resolution() {
        let clock = InterfaceClock {
            resolution: 0x80 | 10,
            offset_secs: 0,
        };
        // 1024 ticks of 2^-10 s
        assert_eq!(clock.capture_time(1024 * 3 + 512), Duration::from_millis(3_500));

        let millis = InterfaceClock {
            resolution: 3,
            offset_secs: 0,
        };
        assert_eq!(millis.capture_time(1_250), Duration::from_millis(1_250));
        assert_eq!(InterfaceClock::default().capture_time(1), Duration::from_micros(1));
    }

    #[test]
    fn missing_capture_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_capture(&dir.path().join("missing.pcapng")).is_err());
    }
}
