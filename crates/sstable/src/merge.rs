//! K-way merge over multiple [`SSTableReader`]s.
//!
//! Produces `(key, ValueEntry)` pairs in ascending key order. When the same
//! key appears in more than one input, only the entry with the **highest
//! sequence number** is kept (newest wins) — this is the core primitive
//! compaction uses to fold N input SSTables into fewer, larger ones.

use memtable::ValueEntry;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::reader::SstIter;
use crate::{SSTableReader, SstError};

struct HeapEntry {
    key: Vec<u8>,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse the key comparison so the
        // smallest key surfaces first.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Lazily merges several SSTables' entry streams into one sorted stream.
pub struct MergeIterator {
    iters: Vec<SstIter>,
    fronts: Vec<Option<(Vec<u8>, ValueEntry)>>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergeIterator {
    /// Opens a fresh sequential iterator over each reader and primes the
    /// merge heap with each source's first key.
    pub fn new(readers: &[SSTableReader]) -> Result<Self, SstError> {
        let mut iters = Vec::with_capacity(readers.len());
        let mut fronts = Vec::with_capacity(readers.len());
        let mut heap = BinaryHeap::new();

        for (i, reader) in readers.iter().enumerate() {
            let mut it = reader.iterator()?;
            let front = it.next().transpose()?;
            if let Some((key, _)) = &front {
                heap.push(HeapEntry {
                    key: key.clone(),
                    source: i,
                });
            }
            iters.push(it);
            fronts.push(front);
        }

        Ok(Self {
            iters,
            fronts,
            heap,
        })
    }

    fn advance(&mut self, source: usize) -> Result<(), SstError> {
        let next = self.iters[source].next().transpose()?;
        if let Some((key, _)) = &next {
            self.heap.push(HeapEntry {
                key: key.clone(),
                source,
            });
        }
        self.fronts[source] = next;
        Ok(())
    }

    /// Returns the next `(key, ValueEntry)` in ascending order, resolving
    /// duplicate keys by keeping the entry with the highest sequence number.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, ValueEntry)>, SstError> {
        let top = match self.heap.pop() {
            Some(e) => e,
            None => return Ok(None),
        };

        let (best_key, mut best_entry) = self.fronts[top.source]
            .take()
            .expect("heap entry without a buffered front");
        self.advance(top.source)?;

        while let Some(peek) = self.heap.peek() {
            if peek.key != best_key {
                break;
            }
            let dup = self.heap.pop().unwrap();
            if let Some((_, dup_entry)) = self.fronts[dup.source].take() {
                if dup_entry.seq > best_entry.seq {
                    best_entry = dup_entry;
                }
            }
            self.advance(dup.source)?;
        }

        Ok(Some((best_key, best_entry)))
    }

    /// Collects every remaining entry into a `Vec`. Useful for tests and for
    /// small compactions where streaming to disk isn't necessary.
    pub fn collect_all(&mut self) -> Result<Vec<(Vec<u8>, ValueEntry)>, SstError> {
        let mut out = Vec::new();
        while let Some(pair) = self.next_entry()? {
            out.push(pair);
        }
        Ok(out)
    }
}
