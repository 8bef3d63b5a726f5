//! Shared domain re-exports and the reservation-match tag used by the
//! analytics events. Domain types (`Reservation`, `Duid`, `LeaseV6`, ...)
//! live at the crate root; re-exported here so call sites that spell them
//! as `crate::types::Duid` and call sites that spell them as `crate::Duid`
//! both resolve to the same type.

pub use crate::{Duid, LeaseV4, LeaseV6, Option82, Option1837, Reservation, V4Key, V4Subnet};

/// How a client's reservation was located. Recorded purely for analytics/
/// debugging; never changes dispatch behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationMatch {
    Mac,
    Option82(&'static str),
    Option1837(&'static str),
    Duid,
}

impl ReservationMatch {
    pub fn mac() -> Self {
        Self::Mac
    }

    pub fn option82(extractor_name: &'static str) -> Self {
        Self::Option82(extractor_name)
    }

    pub fn option1837(extractor_name: &'static str) -> Self {
        Self::Option1837(extractor_name)
    }

    pub fn duid() -> Self {
        Self::Duid
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationMatch::Mac => "mac",
            ReservationMatch::Option82(_) => "option82",
            ReservationMatch::Option1837(_) => "option1837",
            ReservationMatch::Duid => "duid",
        }
    }
}
