use crate::impact::RiskLevel;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

const NIL: usize = usize::MAX;

/// Cached result of one impact computation. Paths are held by value in the
/// internal absolute form, so an entry stays valid to read even after the
/// graph that produced it has mutated (the cache is invalidated before any
/// such read can observe a stale set).
#[derive(Debug, Clone)]
pub struct MemoEntry {
    /// Transitive closure of dependents of the key (key excluded).
    pub impact_set: Vec<String>,
    pub direct_count: usize,
    pub transitive_count: usize,
    pub risk_level: RiskLevel,
    /// file → cascade distance from the key's component.
    pub cascade_levels: HashMap<String, u32>,
    pub computed_at: Instant,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MemoStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug)]
struct Slot {
    key: String,
    entry: MemoEntry,
    prev: usize,
    next: usize,
}

/// Memoised impact results with LRU eviction and a reverse index
/// file → {keys whose impact set contains it, or that equal it}. The index
/// makes invalidation O(affected keys) instead of a full scan.
///
/// Recency lives in a doubly-linked list threaded through an arena of slots;
/// freed slots are recycled through a free list.
#[derive(Debug)]
pub struct MemoCache {
    slots: Vec<Option<Slot>>,
    map: HashMap<String, usize>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    reverse: HashMap<String, HashSet<String>>,
    max_size: usize,
    hits: u64,
    misses: u64,
}

pub const DEFAULT_MEMO_CAPACITY: usize = 500;

impl Default for MemoCache {
    fn default() -> Self {
        Self::new(DEFAULT_MEMO_CAPACITY)
    }
}

impl MemoCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            slots: Vec::new(),
            map: HashMap::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            reverse: HashMap::new(),
            max_size: max_size.max(1),
            hits: 0,
            misses: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Look up a cached result, bumping its recency on a hit.
    pub fn get(&mut self, key: &str) -> Option<&MemoEntry> {
        match self.map.get(key).copied() {
            Some(slot) => {
                self.hits += 1;
                self.detach(slot);
                self.push_front(slot);
                self.slots[slot].as_ref().map(|s| &s.entry)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a result, replacing any previous entry for `key` and evicting
    /// least-recently-used entries down to capacity.
    pub fn set(&mut self, key: &str, entry: MemoEntry) {
        if let Some(slot) = self.map.get(key).copied() {
            self.remove_slot(slot);
        }
        let slot = self.alloc(Slot {
            key: key.to_string(),
            entry,
            prev: NIL,
            next: NIL,
        });
        self.push_front(slot);
        self.map.insert(key.to_string(), slot);
        self.index_slot(slot);

        while self.map.len() > self.max_size {
            let tail = self.tail;
            debug_assert_ne!(tail, NIL);
            log::debug!(
                "memo: evicting {}",
                self.slots[tail].as_ref().map(|s| s.key.as_str()).unwrap_or("?")
            );
            self.remove_slot(tail);
        }
    }

    /// Drop every key whose cached impact set intersects `files` (a key also
    /// indexes itself). Returns the number of entries removed.
    pub fn invalidate(&mut self, files: &[String]) -> usize {
        let mut keys: HashSet<String> = HashSet::new();
        for f in files {
            if let Some(set) = self.reverse.get(f) {
                keys.extend(set.iter().cloned());
            }
        }
        let mut removed = 0;
        for key in keys {
            if let Some(slot) = self.map.get(&key).copied() {
                self.remove_slot(slot);
                removed += 1;
            }
        }
        removed
    }

    /// Clear everything except the hit/miss counters, which are diagnostic.
    pub fn invalidate_all(&mut self) {
        self.slots.clear();
        self.map.clear();
        self.free.clear();
        self.reverse.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            size: self.map.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    fn alloc(&mut self, slot: Slot) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(slot);
            idx
        } else {
            self.slots.push(Some(slot));
            self.slots.len() - 1
        }
    }

    fn index_slot(&mut self, slot: usize) {
        let (key, files) = {
            let s = self.slots[slot].as_ref().expect("indexing a freed slot");
            (s.key.clone(), s.entry.impact_set.clone())
        };
        self.reverse
            .entry(key.clone())
            .or_default()
            .insert(key.clone());
        for f in files {
            self.reverse.entry(f).or_default().insert(key.clone());
        }
    }

    fn unindex_slot(&mut self, slot: usize) {
        let (key, files) = {
            let s = self.slots[slot].as_ref().expect("unindexing a freed slot");
            (s.key.clone(), s.entry.impact_set.clone())
        };
        for f in files.iter().chain(std::iter::once(&key)) {
            if let Some(set) = self.reverse.get_mut(f) {
                set.remove(&key);
                if set.is_empty() {
                    self.reverse.remove(f);
                }
            }
        }
    }

    fn remove_slot(&mut self, slot: usize) {
        self.unindex_slot(slot);
        self.detach(slot);
        let s = self.slots[slot].take().expect("double free of memo slot");
        self.map.remove(&s.key);
        self.free.push(slot);
    }

    fn detach(&mut self, slot: usize) {
        let (prev, next) = {
            let s = self.slots[slot].as_ref().expect("detaching a freed slot");
            (s.prev, s.next)
        };
        if prev != NIL {
            self.slots[prev].as_mut().unwrap().next = next;
        } else if self.head == slot {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].as_mut().unwrap().prev = prev;
        } else if self.tail == slot {
            self.tail = prev;
        }
        let s = self.slots[slot].as_mut().unwrap();
        s.prev = NIL;
        s.next = NIL;
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        {
            let s = self.slots[slot].as_mut().unwrap();
            s.prev = NIL;
            s.next = old_head;
        }
        if old_head != NIL {
            self.slots[old_head].as_mut().unwrap().prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }
}
