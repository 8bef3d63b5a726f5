use std::sync::Arc;

use crate::{
    leasedb::LeaseDb, reservationdb::ReservationDb, types::ReservationMatch,
    v6::extensions::ShadowRelayMessageExtV6, v6::extractors::NamedOption1837Extractor, Duid,
    Reservation,
};
use dhcproto::v6::RelayMessage;

/// Attempt to find a reservation using different lookup priorities:
///
/// 1. By DUID
/// 2. By Option 18/37 (relay agent options), tried through each configured extractor
/// 3. By MAC (client link-layer address or Option 82 fallback recorded on a prior lease)
///
/// Returns the reservation along with match metadata (method and extractor used).
pub fn find_reservation(
    reservations: &ReservationDb,
    leases: &LeaseDb,
    extractors: &[NamedOption1837Extractor],
    relay_msg: &RelayMessage,
    client_id: &Duid,
) -> Option<(Arc<Reservation>, ReservationMatch)> {
    // Priority 1: DUID
    if let Some(res) = reservations.by_duid(client_id) {
        return Some((res, ReservationMatch::duid()));
    }

    // Priority 2: Option 18/37 with extractors
    if let Some(opt1837) = relay_msg.option1837() {
        if let Some(result) = extractors.iter().find_map(|(name, extractor)| {
            extractor(&opt1837)
                .and_then(|extracted| reservations.by_opt1837(&extracted))
                .map(|res| (res, ReservationMatch::option1837(name)))
        }) {
            return Some(result);
        }
    }

    // Priority 3: MAC address (relay-advertised link-layer address, or one recorded
    // against this client's Option 82 on a prior lease)
    if let Some(mac) = relay_msg.hw_addr() {
        if let Some(res) = reservations.by_mac(&mac) {
            return Some((res, ReservationMatch::mac()));
        }
        if let Some(res) = leases
            .get_opt82_by_mac(&mac)
            .and_then(|opt82| reservations.by_opt82(&opt82))
        {
            return Some((res, ReservationMatch::mac()));
        }
    }

    None
}
