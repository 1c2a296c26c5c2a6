//! Item ids collected during one listing crawl.

use rand::seq::SliceRandom;
use std::collections::HashSet;

/// Returned by [`IdsStore::add`] for an id that was already collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateId(pub i64);

/// Set of item ids seen by one crawl, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct IdsStore {
    seen: HashSet<i64>,
    order: Vec<i64>,
}

impl IdsStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an id.
    ///
    /// # Errors
    /// Returns [`DuplicateId`] if the id is already present.
    pub fn add(&mut self, id: i64) -> Result<(), DuplicateId> {
        if !self.seen.insert(id) {
            return Err(DuplicateId(id));
        }
        self.order.push(id);
        Ok(())
    }

    /// Whether `id` was collected.
    #[must_use]
    pub fn contains(&self, id: i64) -> bool {
        self.seen.contains(&id)
    }

    /// Number of collected ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Up to `num` distinct ids in random order.
    #[must_use]
    pub fn random_ids(&self, num: usize) -> Vec<i64> {
        let mut rng = rand::thread_rng();
        self.order.choose_multiple(&mut rng, num).copied().collect()
    }

    /// Ids in first-seen order.
    #[must_use]
    pub fn ids(&self) -> &[i64] {
        &self.order
    }
}
