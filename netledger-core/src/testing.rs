//! Test doubles shared by the core unit tests.

use crate::packet::{CapturedFrame, CapturedPacket, Flow, TransportFlow};

#[derive(Debug, Clone)]
pub(crate) struct StaticFrame {
    pub network: Option<Flow>,
    pub transport: Option<TransportFlow>,
}

impl StaticFrame {
    pub fn tcp(src: &str, src_port: u16, dst: &str, dst_port: u16) -> Self {
        Self {
            network: Some(Flow::new(src, dst)),
            transport: Some(TransportFlow {
                protocol: "TCP".into(),
                flow: Flow::new(src_port.to_string(), dst_port.to_string()),
            }),
        }
    }
}

impl CapturedFrame for StaticFrame {
    fn network_flow(&self) -> Option<Flow> {
        self.network.clone()
    }

    fn transport_flow(&self) -> Option<TransportFlow> {
        self.transport.clone()
    }

    fn raw_bytes(&self) -> &[u8] {
        &[]
    }
}

pub(crate) fn packet_from(device_id: &str) -> CapturedPacket {
    CapturedPacket::new(
        Box::new(StaticFrame::tcp("10.0.0.1", 40000, "10.0.0.2", 443)),
        device_id,
    )
}
