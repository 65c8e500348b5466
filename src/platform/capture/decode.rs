//! Ethernet frame to [`PacketEvent`] decoding.

use std::collections::HashSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;

use crate::core::monitor::model::{Direction, PacketEvent, Protocol};

/// Decode one frame and orient it against the host's own addresses.
///
/// Frames that neither start nor end at a local address (promiscuous
/// traffic) and non-IP frames yield `None`.
pub fn decode_frame(
    frame: &[u8],
    local_addrs: &HashSet<IpAddr>,
    at: DateTime<Utc>,
) -> Option<PacketEvent> {
    let ethernet = EthernetPacket::new(frame)?;
    let size = u32::try_from(frame.len()).unwrap_or(u32::MAX);

    let (src, dst, next, payload) = match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            let ip = Ipv4Packet::new(ethernet.payload())?;
            (
                IpAddr::V4(ip.get_source()),
                IpAddr::V4(ip.get_destination()),
                ip.get_next_level_protocol(),
                ip.payload().to_vec(),
            )
        }
        EtherTypes::Ipv6 => {
            let ip = Ipv6Packet::new(ethernet.payload())?;
            (
                IpAddr::V6(ip.get_source()),
                IpAddr::V6(ip.get_destination()),
                ip.get_next_header(),
                ip.payload().to_vec(),
            )
        }
        _ => return None,
    };

    let (protocol, src_port, dst_port) = transport(next, &payload);

    let (direction, local_ip, local_port, remote_ip, remote_port) = if local_addrs.contains(&src) {
        (Direction::Outbound, src, src_port, dst, dst_port)
    } else if local_addrs.contains(&dst) {
        (Direction::Inbound, dst, dst_port, src, src_port)
    } else {
        return None;
    };

    Some(PacketEvent {
        timestamp: at,
        protocol,
        local_ip,
        local_port,
        remote_ip,
        remote_port,
        size,
        direction,
    })
}

fn transport(next: IpNextHeaderProtocol, payload: &[u8]) -> (Protocol, u16, u16) {
    match next {
        IpNextHeaderProtocols::Tcp => TcpPacket::new(payload)
            .map(|tcp| (Protocol::Tcp, tcp.get_source(), tcp.get_destination()))
            .unwrap_or((Protocol::Tcp, 0, 0)),
        IpNextHeaderProtocols::Udp => UdpPacket::new(payload)
            .map(|udp| (Protocol::Udp, udp.get_source(), udp.get_destination()))
            .unwrap_or((Protocol::Udp, 0, 0)),
        IpNextHeaderProtocols::Icmp | IpNextHeaderProtocols::Icmpv6 => (Protocol::Icmp, 0, 0),
        _ => (Protocol::Other, 0, 0),
    }
}
