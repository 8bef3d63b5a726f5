use std::sync::Arc;

use advmac::MacAddr6;
use dhcproto::v4::{self, DhcpOption, Flags};
use std::net::Ipv4Addr;
use tracing::{debug, error, field, info, instrument, warn, Span};

use crate::{config::Config, leasedb::LeaseDb, reservationdb::ReservationDb, Reservation, V4Key};

use crate::types::ReservationMatch;
use crate::v4::{
    extensions::ShadowMessageExtV4, reservation::find_reservation, ADDRESS_LEASE_TIME,
    REBINDING_TIME, RENEWAL_TIME,
};

/// A DHCPv4 response message produced by the server.
///
/// If a reservation was used to construct the message, it is included for
/// logging and observability.
pub struct ResponseMessage {
    pub message: v4::Message,
    pub reservation: Option<Arc<Reservation>>,
    pub reservation_match: Option<ReservationMatch>,
}

#[derive(Debug, Copy, Clone)]
pub enum NoResponseReason {
    NotBootRequest,
    NoMessageType,
    NoMacAddress,
    NoReservation,
    NoSubnetConfigured,
    WrongServerId,
    UnrecognizedVariant,
    Discarded,
}

impl NoResponseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoResponseReason::NotBootRequest => "NotBootRequest",
            NoResponseReason::NoMessageType => "NoMessageType",
            NoResponseReason::NoMacAddress => "NoMacAddress",
            NoResponseReason::NoReservation => "NoReservation",
            NoResponseReason::NoSubnetConfigured => "NoSubnetConfigured",
            NoResponseReason::WrongServerId => "WrongServerId",
            NoResponseReason::UnrecognizedVariant => "UnrecognizedVariant",
            NoResponseReason::Discarded => "Discarded",
        }
    }
}

/// Result of processing an incoming DHCPv4 message.
pub enum DhcpV4Response {
    Message(ResponseMessage),
    NoResponse(NoResponseReason),
}

/// 4.3 A DHCP server can receive the following messages from a client:
/// * DHCPDISCOVER
/// * DHCPREQUEST
/// * DHCPDECLINE
/// * DHCPRELEASE
/// * DHCPINFORM
pub fn handle_message(
    reservations: &ReservationDb,
    leases: &LeaseDb,
    config: &Config,
    msg: &v4::Message,
) -> DhcpV4Response {
    // servers should only respond to BootRequest messages
    let message_type = match msg.opcode() {
        v4::Opcode::BootRequest => match msg.message_type() {
            Some(mt) => *mt,
            None => return DhcpV4Response::NoResponse(NoResponseReason::NoMessageType),
        },
        // Servers don't receive BootReply
        v4::Opcode::BootReply => return DhcpV4Response::NoResponse(NoResponseReason::Discarded),
        // Skip handling Unknown
        v4::Opcode::Unknown(_) => return DhcpV4Response::NoResponse(NoResponseReason::Discarded),
    };

    match message_type {
        v4::MessageType::Discover => handle_discover(reservations, config, msg),
        v4::MessageType::Request => handle_request(reservations, leases, config, msg),
        v4::MessageType::Decline => handle_decline(leases, msg),
        v4::MessageType::Release => handle_release(leases, msg),
        // If a client has obtained a network address through some other means (e.g., manual
        // configuration), it may use a DHCPINFORM request message to obtain other local
        // configuration parameters. Unicast reply sent to the client.
        v4::MessageType::Inform => handle_inform(config, msg),
        // Other messages are not valid for a server to receive
        _ => DhcpV4Response::NoResponse(NoResponseReason::Discarded),
    }
}

fn subnet_for(
    config: &Config,
    ip: Ipv4Addr,
) -> Option<(Ipv4Addr, Ipv4Addr)> {
    config
        .subnets_v4
        .iter()
        .find(|subnet| subnet.net.contains(&ip))
        .map(|subnet| (subnet.gateway, subnet.reply_netmask()))
}

/// Client is discovering available DHCP servers, reply with DHCPOFFER message with
/// available parameters.
///
/// <https://datatracker.ietf.org/doc/html/rfc2131#section-4.3.1>
#[instrument(skip(reservations, config, msg),
fields(mac = field::Empty, xid = %msg.xid()))]
fn handle_discover(
    reservations: &ReservationDb,
    config: &Config,
    msg: &v4::Message,
) -> DhcpV4Response {
    // get client hwaddr, or option82 key
    let mac_addr = match MacAddr6::try_from(msg.chaddr()) {
        Ok(mac) => mac,
        Err(_) => return DhcpV4Response::NoResponse(NoResponseReason::NoMacAddress),
    };
    Span::current().record("mac", field::display(mac_addr));
    let relay = msg.relay_agent_information();
    info!("DHCPDiscover");

    let (reservation, reservation_match) =
        match find_reservation(reservations, &config.option82_extractors, mac_addr, relay) {
            Some((r, m)) => {
                info!(ipv4 = %r.ipv4, "Found reservation for IP");
                (r, m)
            }
            None => {
                info!("No reservation found");
                return DhcpV4Response::NoResponse(NoResponseReason::NoReservation);
            }
        };

    let (gateway, subnet_mask) = match subnet_for(config, reservation.ipv4) {
        Some(found) => found,
        None => {
            error!("Couldn't find configured subnet for {}", &reservation.ipv4);
            return DhcpV4Response::NoResponse(NoResponseReason::NoSubnetConfigured);
        }
    };

    let unspecified = Ipv4Addr::UNSPECIFIED;
    let mut reply = v4::Message::new_with_id(
        msg.xid(),
        unspecified,
        reservation.ipv4,
        unspecified,
        msg.giaddr(),
        msg.chaddr(),
    );
    reply.set_opcode(v4::Opcode::BootReply);
    reply.set_secs(0);
    reply.set_flags(msg.flags());
    reply.set_sname("dhcp.shadowinter.net".as_bytes());

    let opts = reply.opts_mut();

    opts.insert(DhcpOption::MessageType(v4::MessageType::Offer));
    opts.insert(DhcpOption::ServerIdentifier(config.v4_server_id));
    opts.insert(DhcpOption::SubnetMask(subnet_mask));
    opts.insert(DhcpOption::Router(vec![gateway]));
    opts.insert(DhcpOption::DomainNameServer(config.dns_v4.clone()));
    opts.insert(DhcpOption::AddressLeaseTime(ADDRESS_LEASE_TIME));
    opts.insert(DhcpOption::Renewal(RENEWAL_TIME));
    opts.insert(DhcpOption::Rebinding(REBINDING_TIME));
    echo_relay_option82(&mut reply, msg);
    reply.opts_mut().insert(DhcpOption::End);

    DhcpV4Response::Message(ResponseMessage {
        message: reply,
        reservation: Some(reservation),
        reservation_match: Some(reservation_match),
    })
}

/// Echoes the client's relay agent information (Option 82) back into the
/// reply verbatim, per RFC 3046 §2.1: a relay receiving a reply with no
/// Option 82 drops it instead of forwarding to the client.
fn echo_relay_option82(reply: &mut v4::Message, request: &v4::Message) {
    if let Some(relay_info) = request.relay_agent_information() {
        reply
            .opts_mut()
            .insert(DhcpOption::RelayAgentInformation(relay_info.clone()));
    }
}

/// DHCPREQUEST - Client message to servers either (a) requesting offered parameters from one server
/// and implicitly declining offers from all others, (b) confirming correctness of previously allocated
/// address after, e.g., system reboot, or (c) extending the lease on a particular network address
///
/// <https://datatracker.ietf.org/doc/html/rfc2131#section-4.3.2>
#[instrument(skip(reservations, config, msg, leases),
fields(mac = field::Empty, xid = %msg.xid()))]
fn handle_request(
    reservations: &ReservationDb,
    leases: &LeaseDb,
    config: &Config,
    msg: &v4::Message,
) -> DhcpV4Response {
    // Four variants of DHCPREQUEST
    //  * SELECTING
    //    server id is set from the client and matches
    //    ciaddr must be zero
    //    requested ip address option must be filled with the value received previously in the DHCPOFFER from the server
    //    giaddr contains relay IP address
    //  * INIT/REBOOT
    //    no server id from client
    //    ciaddr must be zero
    //    requested ip address option must be filled
    //  * RENEW - client trying to extend its lease, sent unicast directly to server
    //    server id is not set
    //    ciaddr must be filled in
    //    requested ip address option is not filled in
    //  * REBINDING - when client can not reach server unicast, it broadcasts.
    //    same prereqs as RENEW, but sent via the relay

    let mac_addr = match MacAddr6::try_from(msg.chaddr()) {
        Ok(mac) => mac,
        Err(_) => return DhcpV4Response::NoResponse(NoResponseReason::NoMacAddress),
    };
    let relay = msg.relay_agent_information();
    Span::current().record("mac", field::display(mac_addr));
    info!("DHCPRequest");

    let (reservation, reservation_match) =
        match find_reservation(reservations, &config.option82_extractors, mac_addr, relay) {
            Some((r, m)) => {
                info!(ipv4 = %r.ipv4, "Found reservation for IP");
                (r, m)
            }
            None => {
                info!("No reservation found");
                return DhcpV4Response::NoResponse(NoResponseReason::NoReservation);
            }
        };

    let (gateway, subnet_mask) = match subnet_for(config, reservation.ipv4) {
        Some(found) => found,
        None => {
            warn!("Couldn't find configured subnet for {}", &reservation.ipv4);
            return DhcpV4Response::NoResponse(NoResponseReason::NoSubnetConfigured);
        }
    };

    let unspecified = Ipv4Addr::UNSPECIFIED;
    let mut reply = v4::Message::new_with_id(
        msg.xid(),
        unspecified,
        reservation.ipv4,
        unspecified,
        msg.giaddr(),
        msg.chaddr(),
    );
    reply.set_opcode(v4::Opcode::BootReply);
    reply.set_secs(0);
    reply.set_flags(msg.flags());
    reply.set_sname("dhcp.shadowinter.net".as_bytes());

    // select one of the four variants:
    let variant_tuple = (msg.server_id(), &msg.ciaddr(), msg.requested_ip_addr());
    let client_requested_ip = match variant_tuple {
        (Some(server_id), &Ipv4Addr::UNSPECIFIED, Some(requested_ip)) => {
            debug!("variant: selecting");
            if server_id != &config.v4_server_id {
                info!(%server_id, "SELECTING server id did not match");
                return DhcpV4Response::NoResponse(NoResponseReason::WrongServerId);
            }
            requested_ip
        }
        (None, &Ipv4Addr::UNSPECIFIED, Some(requested_ip)) => {
            debug!("variant: init-reboot");
            requested_ip
        }
        (None, ciaddr, None) if ciaddr != &Ipv4Addr::UNSPECIFIED => {
            if msg.giaddr() == Ipv4Addr::UNSPECIFIED {
                debug!("variant: renew")
            } else {
                debug!("variant: rebinding")
            }
            ciaddr
        }
        _ => {
            info!("Unrecognized DHCPREQUEST variant");
            return DhcpV4Response::NoResponse(NoResponseReason::UnrecognizedVariant);
        }
    };

    if client_requested_ip == &reservation.ipv4 {
        // the server selected in the DHCPREQUEST message commits the binding, and responds with a DHCPACK message
        // containing the configuration parameters for the requesting client. The combination of 'client identifier'
        // or 'chaddr' and assigned network address constitute a unique identifier for the client's lease.
        // If the server is unable to satisfy the DHCPREQUEST message (e.g., the address is already allocated) the
        // server should respond with a DHCPNAK message.
        let opts = reply.opts_mut();
        opts.insert(DhcpOption::MessageType(v4::MessageType::Ack));
        opts.insert(DhcpOption::ServerIdentifier(config.v4_server_id));
        opts.insert(DhcpOption::SubnetMask(subnet_mask));
        opts.insert(DhcpOption::Router(vec![gateway]));
        opts.insert(DhcpOption::DomainNameServer(config.dns_v4.clone()));
        opts.insert(DhcpOption::AddressLeaseTime(ADDRESS_LEASE_TIME));
        opts.insert(DhcpOption::Renewal(RENEWAL_TIME));
        opts.insert(DhcpOption::Rebinding(REBINDING_TIME));
        echo_relay_option82(&mut reply, msg);
        reply.opts_mut().insert(DhcpOption::End);

        // if option82, update the option82 to MAC address mapping:
        if let Some(V4Key::Option82(opt)) = reservation.v4_key() {
            leases.insert_mac_option82_binding(&mac_addr, &opt);
        }

        DhcpV4Response::Message(ResponseMessage {
            message: reply,
            reservation: Some(reservation),
            reservation_match: Some(reservation_match),
        })
    } else {
        warn!(reservation_ipv4 = %reservation.ipv4, %client_requested_ip,
            "client requested ip doesn't match reserved address, sending DHCPNAK",
        );
        // RFC 2131 Table 3: yiaddr in DHCPNAK MUST be 0
        reply.set_yiaddr(Ipv4Addr::UNSPECIFIED);
        if msg.giaddr() != Ipv4Addr::UNSPECIFIED {
            // init-reboot NAK should set broadcast bit when relayed
            let flags = reply.flags();
            reply.set_flags(Flags::set_broadcast(flags));
        }
        let opts = reply.opts_mut();
        opts.insert(DhcpOption::MessageType(v4::MessageType::Nak));
        opts.insert(DhcpOption::ServerIdentifier(config.v4_server_id));
        opts.insert(DhcpOption::End);

        DhcpV4Response::Message(ResponseMessage {
            message: reply,
            reservation: Some(reservation),
            reservation_match: Some(reservation_match),
        })
    }
}

/// DHCPDECLINE - Client has independently discovered that the assigned address is
/// already in use and tells the server to treat it as unavailable. RFC 2131 §4.3.3:
/// the server has no response to send.
#[instrument(skip(leases, msg), fields(mac = field::Empty, xid = %msg.xid()))]
fn handle_decline(leases: &LeaseDb, msg: &v4::Message) -> DhcpV4Response {
    let mac_addr = match MacAddr6::try_from(msg.chaddr()) {
        Ok(mac) => mac,
        Err(_) => return DhcpV4Response::NoResponse(NoResponseReason::NoMacAddress),
    };
    Span::current().record("mac", field::display(mac_addr));

    if let Some((lease_id, lease)) = leases.pool_allocator.find_lease(&mac_addr, None) {
        warn!(ip = %lease.ip, "DHCPDECLINE: marking dynamically-leased address abandoned");
        if let Some(pool) = leases.pools_v4.iter().find(|p| p.net.contains(&lease.ip)) {
            leases.pool_allocator.abandon(&pool, lease_id);
        }
    } else {
        info!("DHCPDECLINE for a reservation-bound or unknown address; nothing to abandon");
    }

    DhcpV4Response::NoResponse(NoResponseReason::Discarded)
}

/// DHCPRELEASE - Client relinquishes a network address it no longer needs. RFC 2131
/// §4.3.4: the server has no response to send.
#[instrument(skip(leases, msg), fields(mac = field::Empty, xid = %msg.xid()))]
fn handle_release(leases: &LeaseDb, msg: &v4::Message) -> DhcpV4Response {
    let mac_addr = match MacAddr6::try_from(msg.chaddr()) {
        Ok(mac) => mac,
        Err(_) => return DhcpV4Response::NoResponse(NoResponseReason::NoMacAddress),
    };
    Span::current().record("mac", field::display(mac_addr));

    if let Some((lease_id, lease)) = leases.pool_allocator.find_lease(&mac_addr, None) {
        info!(ip = %lease.ip, "DHCPRELEASE: freeing dynamically-leased address");
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if let Some(pool) = leases.pools_v4.iter().find(|p| p.net.contains(&lease.ip)) {
            leases.pool_allocator.release(&pool, lease_id, now);
        }
    } else {
        info!("DHCPRELEASE for a reservation-bound or unknown address; nothing to free");
    }

    DhcpV4Response::NoResponse(NoResponseReason::Discarded)
}

/// DHCPINFORM - Client already has an address (e.g. manually configured) and wants
/// only the local configuration parameters. RFC 2131 §4.3.5: no address is leased,
/// no 'yiaddr' is set, reply is unicast to the address in 'ciaddr'.
#[instrument(skip(config, msg), fields(xid = %msg.xid()))]
fn handle_inform(config: &Config, msg: &v4::Message) -> DhcpV4Response {
    let ciaddr = msg.ciaddr();
    if ciaddr == Ipv4Addr::UNSPECIFIED {
        info!("DHCPINFORM with no ciaddr, discarding");
        return DhcpV4Response::NoResponse(NoResponseReason::Discarded);
    }

    let (gateway, subnet_mask) = match subnet_for(config, ciaddr) {
        Some(found) => found,
        None => {
            warn!("Couldn't find configured subnet for INFORM ciaddr {ciaddr}");
            return DhcpV4Response::NoResponse(NoResponseReason::NoSubnetConfigured);
        }
    };

    let unspecified = Ipv4Addr::UNSPECIFIED;
    let mut reply = v4::Message::new_with_id(
        msg.xid(),
        ciaddr,
        unspecified,
        unspecified,
        msg.giaddr(),
        msg.chaddr(),
    );
    reply.set_opcode(v4::Opcode::BootReply);
    reply.set_secs(0);
    reply.set_flags(msg.flags());

    let opts = reply.opts_mut();
    opts.insert(DhcpOption::MessageType(v4::MessageType::Ack));
    opts.insert(DhcpOption::ServerIdentifier(config.v4_server_id));
    opts.insert(DhcpOption::SubnetMask(subnet_mask));
    opts.insert(DhcpOption::Router(vec![gateway]));
    opts.insert(DhcpOption::DomainNameServer(config.dns_v4.clone()));
    opts.insert(DhcpOption::End);

    DhcpV4Response::Message(ResponseMessage {
        message: reply,
        reservation: None,
        reservation_match: None,
    })
}
