// src/engine/cache.rs
//
// Fingerprint cache: identical (image, operation, params) requests run once
// and reuse the artifacts of the first run while those are unchanged.

use crate::config::DEFAULT_CACHE_CAPACITY;
use crate::error::Result;
use crate::ops::Operation;
use parking_lot::Mutex;
use siphasher::sip::SipHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::Hasher;
use std::sync::Arc;
use tracing::warn;

/// Deterministic identity of one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// SipHash-2-4 over the source identity, operation name and params.
    pub fn of(source_key: &str, content_hash: u64, op: &Operation) -> Self {
        let mut hasher = SipHasher::new();
        hasher.write(source_key.as_bytes());
        hasher.write_u8(0xff);
        hasher.write_u64(content_hash);
        hasher.write(op.name().as_bytes());
        hasher.write_u8(0xff);
        if let Operation::Reduce { scale } = op {
            hasher.write_u64(scale.value().to_bits());
        }
        Self(hasher.finish())
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// A cache lookup result; `hit` is false when `value` was just computed.
#[derive(Debug, Clone)]
pub struct Cached<V> {
    pub value: V,
    pub hit: bool,
}

struct Slot<V> {
    owner: String,
    cell: Arc<Mutex<Option<V>>>,
}

struct Slots<V> {
    map: HashMap<Fingerprint, Slot<V>>,
    /// Insertion order, oldest first; drives eviction.
    order: VecDeque<Fingerprint>,
}

impl<V> Slots<V> {
    fn remove(&mut self, fingerprint: Fingerprint) {
        self.map.remove(&fingerprint);
        self.order.retain(|fp| *fp != fingerprint);
    }
}

/// Fingerprint -> value, with one lock per fingerprint so concurrent
/// identical requests compute once while unrelated requests never wait.
///
/// At most `capacity` entries are kept; inserting past that evicts the
/// oldest. A failed computation leaves no entry behind.
pub struct ResultCache<V> {
    slots: Mutex<Slots<V>>,
    capacity: usize,
}

impl<V> std::fmt::Debug for ResultCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("slots", &self.slots.lock().map.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<V: Clone> ResultCache<V> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Empty cache holding at most `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Slots {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return the cached value for `fingerprint` if `is_fresh` accepts it,
    /// otherwise run `compute` and cache its result. Errors are not cached.
    ///
    /// `owner` tags the entry (the source key) for `invalidate_owner`.
    pub fn get_or_try_insert_with<P, F>(
        &self,
        fingerprint: Fingerprint,
        owner: &str,
        is_fresh: P,
        compute: F,
    ) -> Result<Cached<V>>
    where
        P: Fn(&V) -> bool,
        F: FnOnce() -> Result<V>,
    {
        let cell = self.slot(fingerprint, owner);

        let mut entry = cell.lock();
        if let Some(value) = entry.as_ref() {
            if is_fresh(value) {
                return Ok(Cached {
                    value: value.clone(),
                    hit: true,
                });
            }
            warn!(
                owner,
                fingerprint = fingerprint.value(),
                "cached artifacts changed or missing, recomputing"
            );
            *entry = None;
        }

        match compute() {
            Ok(value) => {
                *entry = Some(value.clone());
                Ok(Cached { value, hit: false })
            }
            Err(err) => {
                // lock order is cell then slots; nothing takes a cell under slots
                let mut slots = self.slots.lock();
                let ours = slots
                    .map
                    .get(&fingerprint)
                    .is_some_and(|slot| Arc::ptr_eq(&slot.cell, &cell));
                if ours {
                    slots.remove(fingerprint);
                }
                Err(err)
            }
        }
    }

    fn slot(&self, fingerprint: Fingerprint, owner: &str) -> Arc<Mutex<Option<V>>> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.map.get(&fingerprint) {
            return Arc::clone(&slot.cell);
        }
        while slots.map.len() >= self.capacity {
            let Some(oldest) = slots.order.pop_front() else {
                break;
            };
            slots.map.remove(&oldest);
        }
        let cell = Arc::new(Mutex::new(None));
        slots.map.insert(
            fingerprint,
            Slot {
                owner: owner.to_string(),
                cell: Arc::clone(&cell),
            },
        );
        slots.order.push_back(fingerprint);
        cell
    }

    /// Forget every entry tagged with `owner`. Returns how many were dropped.
    pub fn invalidate_owner(&self, owner: &str) -> usize {
        let mut guard = self.slots.lock();
        let slots = &mut *guard;
        let before = slots.map.len();
        slots.map.retain(|_, slot| slot.owner != owner);
        let map = &slots.map;
        slots.order.retain(|fp| map.contains_key(fp));
        before - slots.map.len()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
