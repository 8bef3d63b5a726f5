//! v4 lease database: the reservation-keyed fast path plus an indexed,
//! state-machined pool allocator for clients with no reservation.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use advmac::MacAddr6;
use dashmap::DashMap;
use ipnet::Ipv4Net;
use parking_lot::RwLock;

use crate::{LeaseV4, LeaseV6, LeaseV6Status, Option82, Reservation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeaseId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Free,
    Offered,
    Active,
    Expired,
    Released,
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct Lease {
    pub ip: Ipv4Addr,
    pub state: LeaseState,
    pub hw: Option<MacAddr6>,
    pub uid: Option<Vec<u8>>,
    pub option82: Option<Option82>,
    /// Seconds since the Unix epoch. `u64::MAX` marks an abandoned lease
    /// that never expires on its own (operator action only).
    pub ends: u64,
}

/// Flat, append-only store of lease records keyed by stable `LeaseId`
/// handles. `supersede_lease` always mutates in place so a `LeaseId`
/// captured before a renewal stays valid after it.
#[derive(Default)]
struct LeaseArena {
    leases: RwLock<Vec<Lease>>,
}

impl LeaseArena {
    fn insert(&self, lease: Lease) -> LeaseId {
        let mut leases = self.leases.write();
        leases.push(lease);
        LeaseId((leases.len() - 1) as u32)
    }

    fn get(&self, id: LeaseId) -> Lease {
        self.leases.read()[id.0 as usize].clone()
    }

    fn set(&self, id: LeaseId, lease: Lease) {
        self.leases.write()[id.0 as usize] = lease;
    }
}

/// One v4 address pool (a subnet's allocatable range). `by_end` is the
/// time-ordered set substituting the original's doubly-linked expiry
/// list: `first()` is always the soonest-expiring lease.
pub struct Pool {
    pub net: Ipv4Net,
    by_end: RwLock<BTreeSet<(u64, LeaseId)>>,
    by_ip: DashMap<Ipv4Addr, LeaseId>,
}

impl Pool {
    pub fn new(net: Ipv4Net) -> Self {
        Self {
            net,
            by_end: RwLock::new(BTreeSet::new()),
            by_ip: DashMap::new(),
        }
    }

    fn track(&self, ip: Ipv4Addr, id: LeaseId, ends: u64) {
        self.by_ip.insert(ip, id);
        self.by_end.write().insert((ends, id));
    }

    fn untrack(&self, ip: Ipv4Addr, id: LeaseId, ends: u64) {
        self.by_ip.remove(&ip);
        self.by_end.write().remove(&(ends, id));
    }

    /// First free (unallocated) address in the pool's host range, or the
    /// soonest-to-expire address if the whole range is currently in use.
    fn candidate_ip(&self, now: u64, reap_grace_secs: u64) -> Option<Ipv4Addr> {
        for host in crate::addr::host_range(&self.net) {
            if !self.by_ip.contains_key(&host) {
                return Some(host);
            }
        }
        let (ends, id) = *self.by_end.read().iter().next()?;
        if ends.saturating_add(reap_grace_secs) < now {
            Some(self.by_ip.iter().find(|e| *e.value() == id)?.key().to_owned())
        } else {
            None
        }
    }
}

/// Indexed, state-machined lease store for clients with no static
/// reservation. Reservation-backed leases keep using `leased_new_v4`/
/// `leased_new_v6` below; this side only ever serves the pool-allocation
/// fallback path.
pub struct LeaseArenaStore {
    arena: LeaseArena,
    by_uid: DashMap<Vec<u8>, LeaseId>,
    by_hw: DashMap<MacAddr6, LeaseId>,
    next_id: AtomicU32,
}

impl Default for LeaseArenaStore {
    fn default() -> Self {
        Self {
            arena: LeaseArena::default(),
            by_uid: DashMap::new(),
            by_hw: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }
}

impl LeaseArenaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds an existing lease for this client in `pool` (by uid, else
    /// hw), preferring an exact address match when `requested_ip` names
    /// one still held by this client.
    pub fn find_lease(
        &self,
        hw: &MacAddr6,
        uid: Option<&[u8]>,
    ) -> Option<(LeaseId, Lease)> {
        let id = uid
            .and_then(|u| self.by_uid.get(u).map(|e| *e.value()))
            .or_else(|| self.by_hw.get(hw).map(|e| *e.value()))?;
        Some((id, self.arena.get(id)))
    }

    /// Allocates (or reuses, if this client already holds one) an address
    /// from `pool`. Returns `None` on pool exhaustion.
    pub fn allocate_lease(
        &self,
        pool: &Pool,
        now: u64,
        lease_time_secs: u64,
        hw: MacAddr6,
        uid: Option<Vec<u8>>,
        option82: Option<Option82>,
        reap_grace_secs: u64,
    ) -> Option<(LeaseId, Ipv4Addr)> {
        if let Some((id, lease)) = self.find_lease(&hw, uid.as_deref()) {
            let ends = now + lease_time_secs;
            pool.untrack(lease.ip, id, lease.ends);
            let mut updated = lease;
            updated.state = LeaseState::Active;
            updated.ends = ends;
            self.arena.set(id, updated.clone());
            pool.track(updated.ip, id, ends);
            return Some((id, updated.ip));
        }

        let ip = pool.candidate_ip(now, reap_grace_secs)?;
        let ends = now + lease_time_secs;
        let lease = Lease {
            ip,
            state: LeaseState::Active,
            hw: Some(hw),
            uid: uid.clone(),
            option82,
            ends,
        };
        let id = LeaseId(self.next_id.fetch_add(1, Ordering::Relaxed));
        // `insert` appends at the arena's own next slot; ids must agree,
        // so this store only ever owns one arena instance (enforced by
        // construction, not checked at runtime).
        let inserted = self.arena.insert(lease);
        debug_assert_eq!(inserted, id);
        self.by_hw.insert(hw, id);
        if let Some(uid) = uid {
            self.by_uid.insert(uid, id);
        }
        pool.track(ip, id, ends);
        Some((id, ip))
    }

    /// DECLINE: the address is abandoned and held until an operator clears
    /// it (`ends = MAX_TIME`).
    pub fn abandon(&self, pool: &Pool, id: LeaseId) {
        let mut lease = self.arena.get(id);
        pool.untrack(lease.ip, id, lease.ends);
        lease.state = LeaseState::Abandoned;
        lease.ends = u64::MAX;
        self.arena.set(id, lease.clone());
        pool.track(lease.ip, id, u64::MAX);
    }

    /// RELEASE: immediately free, available for the next allocation.
    pub fn release(&self, pool: &Pool, id: LeaseId, now: u64) {
        let mut lease = self.arena.get(id);
        pool.untrack(lease.ip, id, lease.ends);
        if let Some(hw) = lease.hw.take() {
            self.by_hw.remove(&hw);
        }
        if let Some(uid) = lease.uid.take() {
            self.by_uid.remove(&uid);
        }
        lease.state = LeaseState::Released;
        lease.ends = now;
        self.arena.set(id, lease.clone());
    }
}

/// Reservation-keyed fast path: direct lookup, no pool allocation involved.
#[derive(Clone)]
pub struct LeaseDb {
    v4: DashMap<Reservation, LeaseV4>,
    v6: DashMap<Reservation, LeaseV6>,
    mac_to_opt82: DashMap<MacAddr6, Option82>,
    pub pools_v4: Arc<DashMap<String, Arc<Pool>>>,
    pub pool_allocator: Arc<LeaseArenaStore>,
}

impl LeaseDb {
    pub fn new() -> Self {
        Self {
            v4: DashMap::new(),
            v6: DashMap::new(),
            mac_to_opt82: DashMap::new(),
            pools_v4: Arc::new(DashMap::new()),
            pool_allocator: Arc::new(LeaseArenaStore::new()),
        }
    }

    pub fn leased_new_v4(&self, reservation: &Reservation, lease: LeaseV4) {
        self.v4.insert(reservation.clone(), lease);
    }

    pub fn leased_new_v6(&self, reservation: &Reservation, lease: LeaseV6) {
        match self.v6.insert(reservation.to_owned(), lease.clone()) {
            Some(old_lease) => {
                tracing::debug!(
                    na = ?reservation.ipv6_na, pd = ?reservation.ipv6_pd, ?old_lease, new_lease = ?lease,
                    "replaced existing v6 lease"
                )
            }
            None => tracing::info!(
                na = ?reservation.ipv6_na, pd = ?reservation.ipv6_pd, duid = %lease.duid, mac = ?lease.mac,
                "leased v6 address for the first time"
            ),
        }
    }

    pub fn lease_v6(&self, reservation: &Reservation) -> Option<LeaseV6> {
        self.v6.get(reservation).map(|e| e.value().clone())
    }

    /// RELEASE: the client is giving up its reservation-backed v6 lease
    /// early. The reservation itself is config, not state, so this only
    /// marks the in-memory lease record released rather than removing the
    /// binding (the reservation stays available for the next Solicit).
    pub fn release_v6(&self, reservation: &Reservation) {
        if let Some(mut entry) = self.v6.get_mut(reservation) {
            entry.status = LeaseV6Status::Released;
        }
    }

    /// DECLINE: the client detected a conflict using the address assigned
    /// to its reservation. Mark the lease abandoned; an operator must
    /// intervene, it is never reclaimed automatically.
    pub fn decline_v6(&self, reservation: &Reservation) {
        if let Some(mut entry) = self.v6.get_mut(reservation) {
            entry.status = LeaseV6Status::Abandoned;
        }
    }

    pub fn insert_mac_option82_binding(&self, mac_addr: &MacAddr6, opt: &Option82) {
        self.mac_to_opt82.insert(*mac_addr, opt.clone());
    }

    pub fn get_opt82_by_mac(&self, mac_addr: &MacAddr6) -> Option<Option82> {
        self.mac_to_opt82.get(mac_addr).map(|o| o.value().clone())
    }

    pub fn pool_for(&self, name: &str, net: Ipv4Net) -> Arc<Pool> {
        self.pools_v4
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Pool::new(net)))
            .clone()
    }
}

impl Default for LeaseDb {
    fn default() -> Self {
        Self::new()
    }
}
