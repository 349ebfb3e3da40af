//! Captured packet → stored record mapping.

use crate::error::MappingError;
use crate::packet::{CapturedPacket, StoredPacketRecord};

/// Maps a captured packet to the record persisted for it.
///
/// Fails when the frame has no network or transport layer, when a port is
/// not a 16-bit integer, or when the transport protocol has no name.
pub fn map_packet(packet: &CapturedPacket) -> Result<StoredPacketRecord, MappingError> {
    let network = packet
        .frame
        .network_flow()
        .ok_or(MappingError::MissingNetworkLayer)?;
    let transport = packet
        .frame
        .transport_flow()
        .ok_or(MappingError::MissingTransportLayer)?;

    if transport.protocol.trim().is_empty() {
        return Err(MappingError::EmptyProtocol);
    }

    Ok(StoredPacketRecord {
        id: packet.id,
        source_ip: network.source,
        destination_ip: network.destination,
        source_port: parse_port("source", &transport.flow.source)?,
        destination_port: parse_port("destination", &transport.flow.destination)?,
        protocol: transport.protocol,
        captured_at: packet.captured_at,
        updated_at: packet.updated_at,
        device_id: packet.device_id.clone(),
    })
}

/// Maps a whole batch. The first failing packet fails the batch.
pub fn map_batch(packets: &[CapturedPacket]) -> Result<Vec<StoredPacketRecord>, MappingError> {
    packets.iter().map(map_packet).collect()
}

fn parse_port(side: &'static str, value: &str) -> Result<u16, MappingError> {
    value.parse::<u16>().map_err(|_| MappingError::InvalidPort {
        side,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Flow, TransportFlow};
    use crate::testing::{packet_from, StaticFrame};
    use proptest::prelude::*;

    fn tcp_packet() -> CapturedPacket {
        let frame = StaticFrame::tcp("10.0.0.1", 1234, "10.0.0.2", 80);
        CapturedPacket::new(Box::new(frame), "eth0")
    }

    #[test]
    fn maps_tcp_frame() {
        let packet = tcp_packet();
        let record = map_packet(&packet).unwrap();

        assert_eq!(record.source_ip, "10.0.0.1");
        assert_eq!(record.destination_ip, "10.0.0.2");
        assert_eq!(record.source_port, 1234);
        assert_eq!(record.destination_port, 80);
        assert_eq!(record.protocol, "TCP");
        assert_eq!(record.device_id, "eth0");
        assert_eq!(record.captured_at, packet.captured_at);
        assert_eq!(record.updated_at, packet.updated_at);
        assert_eq!(record.id, None);
    }

    #[test]
    fn missing_transport_layer_fails() {
        let frame = StaticFrame {
            network: Some(Flow::new("10.0.0.1", "10.0.0.2")),
            transport: None,
        };
        let packet = CapturedPacket::new(Box::new(frame), "eth0");
        assert_eq!(
            map_packet(&packet),
            Err(MappingError::MissingTransportLayer)
        );
    }

    #[test]
    fn missing_network_layer_fails() {
        let frame = StaticFrame {
            network: None,
            transport: None,
        };
        let packet = CapturedPacket::new(Box::new(frame), "eth0");
        assert_eq!(map_packet(&packet), Err(MappingError::MissingNetworkLayer));
    }

    #[test]
    fn non_numeric_port_is_an_error_not_zero() {
        let frame = StaticFrame {
            network: Some(Flow::new("10.0.0.1", "10.0.0.2")),
            transport: Some(TransportFlow {
                protocol: "TCP".into(),
                flow: Flow::new("http", "80"),
            }),
        };
        let packet = CapturedPacket::new(Box::new(frame), "eth0");
        assert_eq!(
            map_packet(&packet),
            Err(MappingError::InvalidPort {
                side: "source",
                value: "http".into()
            })
        );
    }

    #[test]
    fn one_bad_packet_fails_the_whole_batch() {
        let bad = CapturedPacket::new(
            Box::new(StaticFrame {
                network: Some(Flow::new("10.0.0.9", "10.0.0.2")),
                transport: None,
            }),
            "eth0",
        );
        let batch = vec![tcp_packet(), bad, tcp_packet()];
        assert_eq!(
            map_batch(&batch),
            Err(MappingError::MissingTransportLayer)
        );
    }

    #[test]
    fn maps_batch_in_order() {
        let batch: Vec<_> = ["a", "b", "c"].into_iter().map(packet_from).collect();
        let records = map_batch(&batch).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.device_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    proptest! {
        #[test]
        fn any_u16_port_round_trips(src in any::<u16>(), dst in any::<u16>()) {
            let frame = StaticFrame::tcp("192.168.1.1", src, "192.168.1.2", dst);
            let record = map_packet(&CapturedPacket::new(Box::new(frame), "eth0")).unwrap();
            prop_assert_eq!(record.source_port, src);
            prop_assert_eq!(record.destination_port, dst);
        }

        #[test]
        fn out_of_range_ports_are_rejected(port in 65_536u32..10_000_000) {
            prop_assert!(parse_port("source", &port.to_string()).is_err());
        }
    }
}
