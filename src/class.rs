//! Class engine: named predicates that tag an inbound packet, optionally
//! spawning a subclass keyed on some evaluated data (the "spawn with" class
//! pattern from ISC `dhcpd`'s `server/class.c`). Pools then permit/prohibit
//! allocation by class membership.

use std::sync::Arc;

use arrayvec::ArrayVec;
use dashmap::DashMap;

use crate::scope::{eval_boolean, eval_data, ClassId, EvalContext, Expr};

/// Packets belong to at most this many classes, bounding allocation
/// per packet.
pub const MAX_CLASSES_PER_PACKET: usize = 5;

#[derive(Debug, Clone)]
pub struct Class {
    pub name: String,
    pub match_expr: Expr,
    /// If set, a matching packet spawns (or reuses) a subclass keyed by
    /// this expression's evaluated data rather than matching the class
    /// itself.
    pub spawn_expr: Option<Expr>,
}

/// Process-global, append-mostly table: class name -> class, plus spawned
/// subclasses keyed by `(ClassId, spawned data)`. Matches the "class-name,
/// group-name, host-name hashes are process-global" design note — a
/// `DashMap` gives concurrent readers/writers without a single global lock.
#[derive(Default)]
pub struct ClassTable {
    classes: DashMap<ClassId, Arc<Class>>,
    by_name: DashMap<String, ClassId>,
    spawned: DashMap<(ClassId, Vec<u8>), ClassId>,
    next_id: std::sync::atomic::AtomicUsize,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, class: Class) -> ClassId {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.by_name.insert(class.name.clone(), id);
        self.classes.insert(id, Arc::new(class));
        id
    }

    pub fn get(&self, id: ClassId) -> Option<Arc<Class>> {
        self.classes.get(&id).map(|c| Arc::clone(&c))
    }

    pub fn by_name(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).map(|id| *id)
    }

    /// Returns the `ClassId` for a spawned subclass, creating it (as a
    /// nameless class sharing the parent's match expression semantics
    /// only via the spawn key) the first time this key is seen.
    fn spawned_id(&self, parent: ClassId, key: Vec<u8>) -> ClassId {
        if let Some(id) = self.spawned.get(&(parent, key.clone())) {
            return *id;
        }
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.spawned.insert((parent, key), id);
        id
    }
}

/// Evaluate every registered class's predicate against `ctx`, returning the
/// (bounded) list of classes the packet belongs to, newest-first so later
/// statement overlays see the most specific, most-recently-added class
/// first in iteration.
pub fn classify(ctx: &EvalContext, classes: &ClassTable) -> ArrayVec<ClassId, MAX_CLASSES_PER_PACKET> {
    let mut matched = ArrayVec::new();
    for entry in classes.classes.iter() {
        if matched.is_full() {
            break;
        }
        let id = *entry.key();
        let class = entry.value();
        if eval_boolean(ctx, &class.match_expr) != Some(true) {
            continue;
        }
        let effective_id = match &class.spawn_expr {
            Some(expr) => match eval_data(ctx, expr) {
                Some(key) => classes.spawned_id(id, key),
                None => continue,
            },
            None => id,
        };
        if matched.try_push(effective_id).is_err() {
            break;
        }
    }
    matched.reverse();
    matched
}

/// A pool's permit/prohibit class lists. Matches the predicate used by
/// `leasedb`/`v6pool` pool selection: a pool that prohibits a class a
/// packet belongs to is skipped outright; a pool with a non-empty permit
/// list requires membership in at least one of them.
#[derive(Debug, Clone, Default)]
pub struct ClassFilter {
    pub permit: Vec<ClassId>,
    pub prohibit: Vec<ClassId>,
}

pub fn permitted(filter: &ClassFilter, packet_classes: &[ClassId]) -> bool {
    if filter.prohibit.iter().any(|c| packet_classes.contains(c)) {
        return false;
    }
    if filter.permit.is_empty() {
        return true;
    }
    filter.permit.iter().any(|c| packet_classes.contains(c))
}
