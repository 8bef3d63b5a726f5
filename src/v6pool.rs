//! IPv6 IA/pool engine: MD5-seeded deterministic address and prefix
//! allocation for clients with no fixed reservation, a parametric pool
//! allocator alongside the reservation-keyed fast path. Grounded on ISC
//! `dhcpd`'s `server/mdb6.c` (`build_address6`/`create_lease6`/`create_prefix6`).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicU32, Ordering};

use md5::{Digest, Md5};
use smallvec::SmallVec;

use crate::addr::{is_reserved_iid, mask_host_bits6, overlay_prefix6};
use crate::Duid;

/// Up to 100 attempts for an address, 10 for a prefix, after which
/// allocation gives up and reports exhaustion.
const MAX_ADDRESS_ATTEMPTS: u32 = 100;
const MAX_PREFIX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IaSuboptId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuboptState {
    Active,
    Expired,
    Released,
    Abandoned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingScope;

#[derive(Debug, Clone)]
pub struct IaSubopt {
    pub addr: Ipv6Addr,
    /// Only meaningful when the owning pool is a prefix pool.
    pub prefix_len: u8,
    pub preferred_lt: u32,
    pub valid_lt: u32,
    pub state: SuboptState,
    pub hard_end: u64,
    pub soft_end: u64,
    pub scope: BindingScope,
}

/// One allocation pool: either a /64 NA/TA pool or a delegated-prefix pool
/// (`is_prefix`), parametrized like the original's `ipv6_pool` struct.
pub struct Pool {
    pub start_addr: Ipv6Addr,
    pub bits: u8,
    pub is_temporary: bool,
    pub is_prefix: bool,
    pub plen_alloc: u8,
    by_addr: HashMap<Ipv6Addr, IaSuboptId>,
    active: BinaryHeap<Reverse<(u64, u64, IaSuboptId)>>,
    inactive: BinaryHeap<Reverse<(u64, u64, IaSuboptId)>>,
}

impl Pool {
    pub fn new(start_addr: Ipv6Addr, bits: u8, is_temporary: bool) -> Self {
        Self {
            start_addr,
            bits,
            is_temporary,
            is_prefix: false,
            plen_alloc: bits,
            by_addr: HashMap::new(),
            active: BinaryHeap::new(),
            inactive: BinaryHeap::new(),
        }
    }

    pub fn new_prefix(start_addr: Ipv6Addr, bits: u8, plen_alloc: u8) -> Self {
        Self {
            start_addr,
            bits,
            is_temporary: false,
            is_prefix: true,
            plen_alloc,
            by_addr: HashMap::new(),
            active: BinaryHeap::new(),
            inactive: BinaryHeap::new(),
        }
    }

    fn is_free(&self, addr: &Ipv6Addr) -> bool {
        !self.by_addr.contains_key(addr)
    }

    fn track(&mut self, addr: Ipv6Addr, id: IaSuboptId, hard_end: u64, soft_end: u64) {
        self.by_addr.insert(addr, id);
        self.active.push(Reverse((hard_end, soft_end, id)));
    }
}

/// `seed = duid ++ iaid`, hashed with MD5, looping until a free,
/// non-reserved address is found (or attempts are exhausted).
fn hash_candidate(seed: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(seed);
    let digest = hasher.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest);
    out
}

fn extend_seed(seed: &[u8], prev_hash: &[u8; 16]) -> Vec<u8> {
    let mut next = seed.to_vec();
    next.extend_from_slice(prev_hash);
    next
}

/// Deterministically derives an address in `pool` for `(duid, iaid)`,
/// consulting `addresses` (an in-arena lookup, supplied as a closure to
/// avoid this module owning storage) to detect collisions, and rejecting
/// reserved interface identifiers. Returns `None` once `MAX_ADDRESS_ATTEMPTS`
/// is exceeded.
pub fn create_lease6(
    pool: &Pool,
    duid: &Duid,
    iaid: u32,
) -> Option<Ipv6Addr> {
    let mut seed = duid.bytes.clone();
    seed.extend_from_slice(&iaid.to_be_bytes());

    for _ in 0..MAX_ADDRESS_ATTEMPTS {
        let hashed = hash_candidate(&seed);
        let candidate = overlay_prefix6(hashed, pool.start_addr, pool.bits);
        if !is_reserved_iid(&candidate) && pool.is_free(&candidate) {
            return Some(candidate);
        }
        seed = extend_seed(&seed, &hashed);
    }
    None
}

/// Prefix analogue of [`create_lease6`]: the candidate's host bits below
/// `plen_alloc` are zeroed (a delegated prefix, not a single address).
pub fn create_prefix6(pool: &Pool, duid: &Duid, iaid: u32) -> Option<Ipv6Addr> {
    let mut seed = duid.bytes.clone();
    seed.extend_from_slice(&iaid.to_be_bytes());
    seed.push(0x50); // 'P' tag: keeps prefix derivation independent of the address derivation for the same (duid, iaid)

    for _ in 0..MAX_PREFIX_ATTEMPTS {
        let hashed = hash_candidate(&seed);
        let overlaid = overlay_prefix6(hashed, pool.start_addr, pool.bits);
        let candidate = mask_host_bits6(overlaid, pool.plen_alloc);
        if !is_reserved_iid(&candidate) && pool.is_free(&candidate) {
            return Some(candidate);
        }
        seed = extend_seed(&seed, &hashed);
    }
    None
}

/// Inserts a freshly derived address/prefix into the pool's tracking
/// structures, returning the subopt id the caller should key an `Ia` by.
pub fn activate_lease6(
    pool: &mut Pool,
    next_id: &AtomicU32,
    addr: Ipv6Addr,
    preferred_lt: u32,
    valid_lt: u32,
    now: u64,
) -> (IaSuboptId, IaSubopt) {
    let id = IaSuboptId(next_id.fetch_add(1, Ordering::Relaxed));
    let hard_end = now + u64::from(valid_lt);
    let soft_end = now + u64::from(preferred_lt);
    pool.track(addr, id, hard_end, soft_end);
    (
        id,
        IaSubopt {
            addr,
            prefix_len: pool.plen_alloc,
            preferred_lt,
            valid_lt,
            state: SuboptState::Active,
            hard_end,
            soft_end,
            scope: BindingScope::default(),
        },
    )
}

/// Moves `id`'s heap entry to reflect a renewed lifetime without changing
/// its address or identity.
pub fn renew_lease6(pool: &mut Pool, id: IaSuboptId, addr: Ipv6Addr, preferred_lt: u32, valid_lt: u32, now: u64) {
    let hard_end = now + u64::from(valid_lt);
    let soft_end = now + u64::from(preferred_lt);
    pool.active.push(Reverse((hard_end, soft_end, id)));
    pool.by_addr.insert(addr, id);
}

/// Pops expired entries off the active heap (root `hard_end < now`),
/// transitioning them to `Expired` and moving them to the inactive heap.
/// `EXPIRED_IPV6_CLEANUP_TIME`-style grace is left to the caller (it only
/// needs to decide when to stop calling this, not how this reaps).
pub fn reap(pool: &mut Pool, now: u64) -> Vec<IaSuboptId> {
    let mut reaped = Vec::new();
    while let Some(&Reverse((hard_end, soft_end, id))) = pool.active.peek() {
        if hard_end >= now {
            break;
        }
        pool.active.pop();
        pool.inactive.push(Reverse((hard_end, soft_end, id)));
        reaped.push(id);
    }
    reaped
}

/// One client's IA container: an identity-association groups one or more
/// addresses/prefixes under `(iaid, duid)`.
pub struct Ia {
    pub iaid: u32,
    pub duid: Duid,
    pub subopts: SmallVec<[IaSuboptId; 2]>,
}
