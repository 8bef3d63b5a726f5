//! ClickHouse row shapes for v4 and v6 request outcomes.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{SystemTime, UNIX_EPOCH};

use clickhouse::Row;
use dhcproto::{v4, v6};
use serde::Serialize;

use crate::types::ReservationMatch;
use crate::v4::extensions::ShadowMessageExtV4;
use crate::v6::extensions::ShadowMessageExtV6;
use crate::Reservation;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Outcome of one request, tagged by address family for the writer's
/// per-table batching.
#[derive(Debug, Clone)]
pub enum DhcpEvent {
    V4(DhcpEventV4),
    V6(DhcpEventV6),
}

#[derive(Debug, Clone, Serialize, Row)]
pub struct DhcpEventV4 {
    pub timestamp_ms: u64,
    pub message_type: String,
    pub mac_address: String,
    pub relay_address: String,
    pub assigned_ipv4: String,
    pub success: u8,
    pub failure_reason: String,
    pub reservation_match: String,
}

impl DhcpEventV4 {
    pub fn success(
        msg: &v4::Message,
        relay_addr: Ipv4Addr,
        reservation: Option<&Reservation>,
        reservation_match: Option<ReservationMatch>,
    ) -> Self {
        DhcpEventV4 {
            timestamp_ms: now_ms(),
            message_type: msg
                .message_type()
                .map(|mt| format!("{mt:?}"))
                .unwrap_or_default(),
            mac_address: advmac::MacAddr6::try_from(msg.chaddr())
                .map(|m| m.to_string())
                .unwrap_or_default(),
            relay_address: relay_addr.to_string(),
            assigned_ipv4: reservation.map(|r| r.ipv4.to_string()).unwrap_or_default(),
            success: 1,
            failure_reason: String::new(),
            reservation_match: reservation_match
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn failed(msg: &v4::Message, relay_addr: Ipv4Addr, reason: &str) -> Self {
        DhcpEventV4 {
            timestamp_ms: now_ms(),
            message_type: msg
                .message_type()
                .map(|mt| format!("{mt:?}"))
                .unwrap_or_default(),
            mac_address: advmac::MacAddr6::try_from(msg.chaddr())
                .map(|m| m.to_string())
                .unwrap_or_default(),
            relay_address: relay_addr.to_string(),
            assigned_ipv4: String::new(),
            success: 0,
            failure_reason: reason.to_string(),
            reservation_match: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Row)]
pub struct DhcpEventV6 {
    pub timestamp_ms: u64,
    pub message_type: String,
    pub client_id: String,
    pub relay_address: String,
    pub assigned_ipv6_na: String,
    pub assigned_ipv6_pd: String,
    pub success: u8,
    pub failure_reason: String,
    pub reservation_match: String,
}

impl DhcpEventV6 {
    pub fn success(
        inner_msg: &v6::Message,
        _relay_msg: &v6::RelayMessage,
        relay_addr: Ipv6Addr,
        reservation: Option<&Reservation>,
        reservation_match: Option<ReservationMatch>,
    ) -> Self {
        DhcpEventV6 {
            timestamp_ms: now_ms(),
            message_type: format!("{:?}", inner_msg.msg_type()),
            client_id: inner_msg
                .client_id()
                .map(|b| crate::Duid::from(b.to_vec()).to_string())
                .unwrap_or_default(),
            relay_address: relay_addr.to_string(),
            assigned_ipv6_na: reservation
                .map(|r| r.ipv6_na.to_string())
                .unwrap_or_default(),
            assigned_ipv6_pd: reservation
                .map(|r| r.ipv6_pd.to_string())
                .unwrap_or_default(),
            success: 1,
            failure_reason: String::new(),
            reservation_match: reservation_match
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn failed(
        inner_msg: &v6::Message,
        _relay_msg: &v6::RelayMessage,
        relay_addr: Ipv6Addr,
        reason: &str,
    ) -> DhcpEventV6 {
        DhcpEventV6 {
            timestamp_ms: now_ms(),
            message_type: format!("{:?}", inner_msg.msg_type()),
            client_id: inner_msg
                .client_id()
                .map(|b| crate::Duid::from(b.to_vec()).to_string())
                .unwrap_or_default(),
            relay_address: relay_addr.to_string(),
            assigned_ipv6_na: String::new(),
            assigned_ipv6_pd: String::new(),
            success: 0,
            failure_reason: reason.to_string(),
            reservation_match: String::new(),
        }
    }
}
