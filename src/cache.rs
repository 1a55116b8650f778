//! Non-owning sensor cache.
//!
//! Entries are `Weak` handles, so the cache can never keep a sensor alive. An
//! entry whose sensor has been dropped stops resolving immediately and is
//! removed by the next [`SensorCache::prune`], or at once through
//! [`SensorCache::release`]. Mutation takes `&mut self`; callers sharing the
//! cache across threads must wrap it in a lock.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::sensor::{Sensor, SensorId};

#[derive(Default)]
pub struct SensorCache {
    entries: HashMap<SensorId, Weak<dyn Sensor>>,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a non-owning association. Replaces any previous entry for `id`.
    pub fn put(&mut self, id: SensorId, sensor: &Arc<dyn Sensor>) {
        self.entries.insert(id, Arc::downgrade(sensor));
    }

    /// [`SensorCache::put`] under the sensor's own identifier.
    pub fn register(&mut self, sensor: &Arc<dyn Sensor>) {
        self.put(sensor.id().clone(), sensor);
    }

    pub fn get(&self, id: &SensorId) -> Option<Arc<dyn Sensor>> {
        self.entries.get(id).and_then(Weak::upgrade)
    }

    /// Whether an entry for `id` is stored, live or not.
    pub fn contains(&self, id: &SensorId) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove the entry for `id` regardless of whether its sensor is alive.
    pub fn release(&mut self, id: &SensorId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Drop every entry whose sensor has no remaining owner. Returns the count removed.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, sensor| sensor.strong_count() > 0);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Cache pruned.");
        }
        removed
    }

    /// Number of entries that still resolve to a live sensor.
    pub fn size(&self) -> usize {
        self.entries
            .values()
            .filter(|sensor| sensor.strong_count() > 0)
            .count()
    }

    /// Stored entries, including ones awaiting `prune`.
    pub fn raw_len(&self) -> usize {
        self.entries.len()
    }

    /// Upgraded handles to every live sensor, ordered by identifier.
    pub fn live_sensors(&self) -> Vec<Arc<dyn Sensor>> {
        let mut live: Vec<_> = self.entries.values().filter_map(Weak::upgrade).collect();
        live.sort_by(|a, b| a.id().cmp(b.id()));
        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{SensorConfig, SensorKind, SimulatedSensor};

    fn sensor(id: &str) -> Arc<dyn Sensor> {
        Arc::new(SimulatedSensor::new(
            id.into(),
            SensorKind::Temperature,
            &SensorConfig::default(),
        ))
    }

    #[test]
    fn test_cache_does_not_own() {
        let mut cache = SensorCache::new();
        let s = sensor("t-1");
        cache.register(&s);

        assert_eq!(cache.size(), 1);
        assert!(cache.get(&"t-1".into()).is_some());

        drop(s);
        assert!(cache.get(&"t-1".into()).is_none());
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.raw_len(), 1);
        assert!(cache.contains(&"t-1".into()));

        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.raw_len(), 0);
        assert!(!cache.contains(&"t-1".into()));
    }

    #[test]
    fn test_prune_after_releasing_all_owners() {
        let mut cache = SensorCache::new();
        let fleet: Vec<_> = (0..3).map(|i| sensor(&format!("s-{}", i))).collect();
        for s in &fleet {
            cache.register(s);
        }
        assert_eq!(cache.size(), 3);

        drop(fleet);
        cache.prune();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_prune_keeps_live_sensors() {
        let mut cache = SensorCache::new();
        let keep = sensor("keep");
        let gone = sensor("gone");
        cache.register(&keep);
        cache.register(&gone);

        drop(gone);
        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.live_sensors()[0].id().as_str(), "keep");
    }

    #[test]
    fn test_release_is_immediate() {
        let mut cache = SensorCache::new();
        let s = sensor("t-9");
        cache.register(&s);

        assert!(cache.release(s.id()));
        assert_eq!(cache.size(), 0);
        assert!(!cache.release(s.id()));
        // The sensor itself is untouched.
        assert_eq!(s.id().as_str(), "t-9");
    }
}
