use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info};

use crate::error::PoolError;
use crate::events::{PoolReplaced, SlotContent, SwapEvent};
use crate::model::{Record, ResultSet};

/// Displayed slots plus reserve, shared between the scheduler and the engine.
///
/// Rules:
/// - Every record of the active result set is either in exactly one slot or in
///   the reserve, never both.
/// - `install` and `swap_once` take the same lock, so no caller can observe a
///   record that left the reserve without having landed in a slot.
/// - Selection is uniform over the reserve and the occupied slots as they are
///   at the moment of the call.
#[derive(Clone)]
pub struct PoolManager {
    inner: Arc<Mutex<PoolState>>,
}

struct PoolState {
    slots: Vec<Option<Record>>,
    reserve: Vec<Record>,
    generation: u64,
    rng: StdRng,
}

/// Point-in-time copy of the pool, for observers and tests.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub generation: u64,
    pub slots: Vec<Option<Record>>,
    pub reserve: Vec<Record>,
}

impl PoolSnapshot {
    pub fn displayed(&self) -> impl Iterator<Item = &Record> {
        self.slots.iter().flatten()
    }
}

impl PoolManager {
    pub fn new(slot_count: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            inner: Arc::new(Mutex::new(PoolState {
                slots: vec![None; slot_count],
                reserve: Vec::new(),
                generation: 0,
                rng,
            })),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.lock().slots.len()
    }

    /// True once any result set has been installed.
    pub fn is_installed(&self) -> bool {
        self.lock().generation > 0
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Replace the whole pool with `set`: the first N records fill the slots in
    /// order and the rest become the reserve. A set too small to leave at least
    /// one reserve record is rejected and the current pool is kept.
    pub fn install(&self, set: &ResultSet) -> Result<PoolReplaced, PoolError> {
        let mut state = self.lock();
        let needed = state.slots.len() + 1;
        if set.len() < needed {
            return Err(PoolError::InsufficientResults {
                needed,
                available: set.len(),
            });
        }

        let slot_count = state.slots.len();
        let (shown, held) = set.records().split_at(slot_count);
        state.slots = shown.iter().cloned().map(Some).collect();
        state.reserve = held.to_vec();
        state.generation += 1;
        state.check_partition(set.len());

        info!(
            generation = state.generation,
            displayed = slot_count,
            reserve = state.reserve.len(),
            "pool installed"
        );

        Ok(PoolReplaced {
            generation: state.generation,
            slots: shown
                .iter()
                .enumerate()
                .map(|(index, record)| SlotContent {
                    index,
                    record: record.clone(),
                })
                .collect(),
        })
    }

    /// Swap one random occupied slot with one random reserve record.
    pub fn swap_once(&self) -> Result<SwapEvent, PoolError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.generation == 0 {
            return Err(PoolError::InvalidState);
        }

        let occupied: Vec<usize> = state
            .slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|_| idx))
            .collect();
        if state.reserve.is_empty() || occupied.is_empty() {
            return Err(PoolError::NoEligibleRecords);
        }

        let total = state.reserve.len() + occupied.len();
        let reserve_idx = state.rng.random_range(0..state.reserve.len());
        let slot = occupied[state.rng.random_range(0..occupied.len())];

        let incoming = state.reserve.swap_remove(reserve_idx);
        if let Some(outgoing) = state.slots[slot].replace(incoming.clone()) {
            debug!(
                slot,
                incoming = %incoming.id(),
                outgoing = %outgoing.id(),
                "swapped slot"
            );
            state.reserve.push(outgoing);
        }
        state.check_partition(total);

        Ok(SwapEvent {
            generation: state.generation,
            slot,
            record: incoming,
        })
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.lock();
        PoolSnapshot {
            generation: state.generation,
            slots: state.slots.clone(),
            reserve: state.reserve.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Every mutation finishes before it can panic, so a poisoned guard still
        // holds a consistent partition.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PoolState {
    fn check_partition(&self, expected: usize) {
        if cfg!(debug_assertions) {
            let mut ids: Vec<_> = self
                .slots
                .iter()
                .flatten()
                .chain(self.reserve.iter())
                .map(Record::id)
                .collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), expected, "pool partition lost or duplicated a record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{test_record, test_result_set};
    use std::collections::HashSet;

    fn assert_partition(pool: &PoolManager, set: &ResultSet) {
        let snap = pool.snapshot();
        let displayed: Vec<_> = snap.displayed().collect();
        let mut all: Vec<&Record> = displayed.iter().copied().chain(snap.reserve.iter()).collect();
        assert_eq!(all.len(), set.len(), "no omissions or extras");
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all.dedup();
        assert_eq!(all.len(), set.len(), "no duplicates");
        let expected: HashSet<_> = set.iter().collect();
        assert!(all.iter().all(|r| expected.contains(r)));
    }

    #[test]
    fn install_splits_displayed_and_reserve_in_order() {
        let pool = PoolManager::new(20, Some(1));
        let set = test_result_set(25);
        let replaced = pool.install(&set).unwrap();

        assert_eq!(replaced.generation, 1);
        assert_eq!(replaced.slots.len(), 20);
        for (i, slot) in replaced.slots.iter().enumerate() {
            assert_eq!(slot.index, i);
            assert_eq!(slot.record, test_record(i));
        }
        let snap = pool.snapshot();
        assert_eq!(snap.reserve.len(), 5);
        assert_partition(&pool, &set);
    }

    #[test]
    fn install_with_too_few_records_keeps_existing_pool() {
        let pool = PoolManager::new(20, Some(2));
        let set = test_result_set(22);
        pool.install(&set).unwrap();
        pool.swap_once().unwrap();
        let before = pool.snapshot();

        let err = pool.install(&test_result_set(20)).unwrap_err();
        assert_eq!(
            err,
            PoolError::InsufficientResults {
                needed: 21,
                available: 20
            }
        );
        let after = pool.snapshot();
        assert_eq!(after.generation, before.generation);
        assert_eq!(after.slots, before.slots);
        assert_eq!(after.reserve, before.reserve);
    }

    #[test]
    fn install_with_too_few_records_on_fresh_pool_stays_uninstalled() {
        let pool = PoolManager::new(20, Some(3));
        assert!(pool.install(&test_result_set(15)).is_err());
        assert!(!pool.is_installed());
        assert_eq!(pool.swap_once().unwrap_err(), PoolError::InvalidState);
    }

    #[test]
    fn swap_moves_exactly_one_record_each_way() {
        let pool = PoolManager::new(20, Some(4));
        let set = test_result_set(25);
        pool.install(&set).unwrap();

        for _ in 0..200 {
            let before = pool.snapshot();
            let swap = pool.swap_once().unwrap();
            let after = pool.snapshot();

            let previous = before.slots[swap.slot].clone().unwrap();
            assert_ne!(previous, swap.record, "slot must change to a different record");
            assert!(before.reserve.contains(&swap.record));
            assert!(after.reserve.contains(&previous));
            assert!(!after.reserve.contains(&swap.record));
            assert_eq!(after.reserve.len(), 5);

            let changed = before
                .slots
                .iter()
                .zip(after.slots.iter())
                .filter(|(a, b)| a != b)
                .count();
            assert_eq!(changed, 1);
            assert_partition(&pool, &set);
        }
    }

    #[test]
    fn displayed_set_never_contains_duplicates() {
        let pool = PoolManager::new(20, Some(5));
        pool.install(&test_result_set(21)).unwrap();
        for _ in 0..100 {
            pool.swap_once().unwrap();
            let snap = pool.snapshot();
            let ids: HashSet<_> = snap.displayed().map(Record::id).collect();
            assert_eq!(ids.len(), 20);
        }
    }

    #[test]
    fn swap_selection_reaches_every_reserve_record_and_slot() {
        let pool = PoolManager::new(4, Some(6));
        let set = test_result_set(8);
        pool.install(&set).unwrap();

        let mut seen_records = HashSet::new();
        let mut seen_slots = HashSet::new();
        for _ in 0..500 {
            let swap = pool.swap_once().unwrap();
            seen_records.insert(swap.record.id().clone());
            seen_slots.insert(swap.slot);
        }
        assert_eq!(seen_records.len(), 8);
        assert_eq!(seen_slots.len(), 4);
    }

    #[test]
    fn reinstall_replaces_everything_and_bumps_generation() {
        let pool = PoolManager::new(3, Some(7));
        pool.install(&test_result_set(5)).unwrap();
        let fresh = ResultSet::new((100..106).map(test_record).collect()).unwrap();
        let replaced = pool.install(&fresh).unwrap();

        assert_eq!(replaced.generation, 2);
        assert_partition(&pool, &fresh);
        let swap = pool.swap_once().unwrap();
        assert_eq!(swap.generation, 2);
        assert!(fresh.iter().any(|r| *r == swap.record));
    }
}
