//! Link-layer frame decoding with `etherparse`.
//!
//! Frames are kept as raw bytes and sliced on demand, so a frame that never
//! reaches the mapper is never parsed. The handle's link type decides where
//! the network layer starts.

use bytes::Bytes;
use etherparse::{InternetSlice, SlicedPacket, TransportSlice};
use netledger_core::packet::{CapturedFrame, Flow, TransportFlow};
use pcap::Linktype;

/// `DLT_RAW` as reported by `pcap_datalink` on Linux and on the BSDs.
const DLT_RAW_LINUX: Linktype = Linktype(12);
const DLT_RAW_BSD: Linktype = Linktype(14);

const SLL_HEADER_LEN: usize = 16;
const SLL2_HEADER_LEN: usize = 20;

/// A raw frame together with the link type of the handle that read it.
#[derive(Debug, Clone)]
pub struct LinkFrame {
    link_type: Linktype,
    data: Bytes,
}

impl LinkFrame {
    pub fn new(link_type: Linktype, data: impl Into<Bytes>) -> Self {
        Self {
            link_type,
            data: data.into(),
        }
    }

    pub fn ethernet(data: impl Into<Bytes>) -> Self {
        Self::new(Linktype::ETHERNET, data)
    }

    pub fn link_type(&self) -> Linktype {
        self.link_type
    }

    fn sliced(&self) -> Option<SlicedPacket<'_>> {
        let data = &self.data[..];
        match self.link_type {
            Linktype::ETHERNET => SlicedPacket::from_ethernet(data).ok(),
            Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 | DLT_RAW_LINUX | DLT_RAW_BSD => {
                SlicedPacket::from_ip(data).ok()
            }
            // Linux cooked capture: protocol in the last two header bytes (v1)
            // or the first two (v2).
            Linktype::LINUX_SLL => {
                let protocol = u16::from_be_bytes([*data.get(14)?, *data.get(15)?]);
                SlicedPacket::from_ether_type(protocol, data.get(SLL_HEADER_LEN..)?).ok()
            }
            Linktype::LINUX_SLL2 => {
                let protocol = u16::from_be_bytes([*data.first()?, *data.get(1)?]);
                SlicedPacket::from_ether_type(protocol, data.get(SLL2_HEADER_LEN..)?).ok()
            }
            _ => None,
        }
    }
}

impl CapturedFrame for LinkFrame {
    fn network_flow(&self) -> Option<Flow> {
        match self.sliced()?.ip? {
            InternetSlice::Ipv4(header, _) => Some(Flow::new(
                header.source_addr().to_string(),
                header.destination_addr().to_string(),
            )),
            InternetSlice::Ipv6(header, _) => Some(Flow::new(
                header.source_addr().to_string(),
                header.destination_addr().to_string(),
            )),
        }
    }

    /// Only TCP and UDP carry ports; ICMP and unknown payloads have no
    /// transport flow.
    fn transport_flow(&self) -> Option<TransportFlow> {
        let (protocol, source, destination) = match self.sliced()?.transport? {
            TransportSlice::Tcp(header) => ("TCP", header.source_port(), header.destination_port()),
            TransportSlice::Udp(header) => ("UDP", header.source_port(), header.destination_port()),
            _ => return None,
        };
        Some(TransportFlow {
            protocol: protocol.into(),
            flow: Flow::new(source.to_string(), destination.to_string()),
        })
    }

    fn raw_bytes(&self) -> &[u8] {
        &self.data
    }
}
