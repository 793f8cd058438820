use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;

use crate::envelope::Envelope;

/// Pending events keyed by collection name, in arrival order per collection.
///
/// Collection keys are kept sorted, so the request body lists collections
/// alphabetically; only the envelope lists carry arrival order. A client
/// fills a single collection.
///
/// Only the batch loop holds a `Batch` that is still accumulating. A flush
/// detaches it with [`Batch::take`] and the detached value is never written
/// again.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct Batch<T> {
    collections: BTreeMap<String, Vec<Envelope<T>>>,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            collections: BTreeMap::new(),
        }
    }
}

impl<T> Batch<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.values().all(Vec::is_empty)
    }

    /// Total number of envelopes across all collections.
    pub fn len(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    pub fn push(&mut self, collection: &str, envelope: Envelope<T>) {
        match self.collections.get_mut(collection) {
            Some(list) => list.push(envelope),
            None => {
                self.collections
                    .insert(collection.to_owned(), vec![envelope]);
            }
        }
    }

    pub fn get(&self, collection: &str) -> Option<&[Envelope<T>]> {
        self.collections.get(collection).map(Vec::as_slice)
    }

    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Detach everything, leaving an empty batch behind.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Put envelopes from a failed flush in front of the current ones, per
    /// collection, marking each of them as requeued. After this call each
    /// list reads `[older..., self...]`.
    pub fn prepend(&mut self, older: Batch<T>) {
        for (collection, mut list) in older.collections {
            if list.is_empty() {
                continue;
            }
            for envelope in &mut list {
                envelope.requeued = true;
            }
            if let Some(newer) = self.collections.remove(&collection) {
                list.extend(newer);
            }
            self.collections.insert(collection, list);
        }
    }

    /// Number of envelopes that already had their extra attempt.
    pub fn requeued_len(&self) -> usize {
        self.collections
            .values()
            .flatten()
            .filter(|e| e.requeued)
            .count()
    }

    /// Split into `(requeued, fresh)`, keeping order within each part.
    pub fn split_requeued(self) -> (Batch<T>, Batch<T>) {
        let mut requeued = Batch::new();
        let mut fresh = Batch::new();
        for (collection, list) in self.collections {
            for envelope in list {
                if envelope.requeued {
                    requeued.push(&collection, envelope);
                } else {
                    fresh.push(&collection, envelope);
                }
            }
        }
        (requeued, fresh)
    }
}

impl<T: Serialize> Batch<T> {
    /// The request body: `{"<collection>": [<envelope>, ...]}`.
    pub fn to_json(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}
