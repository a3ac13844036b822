// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::errors::RegistryError;
use log::info;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Gear id -> label (the owning application's id).
pub type GearSet = BTreeMap<String, String>;

/// The set of gears being sampled.
///
/// The whole set is swapped on every update, never merged, so a gear that
/// disappears from the population also disappears from sampling. Snapshots
/// are shared immutable maps that readers may hold for as long as they like
/// without blocking updates.
#[derive(Debug, Default)]
pub struct GearRegistry {
    inner: Mutex<Current>,
}

#[derive(Debug, Default)]
struct Current {
    gears: Arc<GearSet>,
    generation: u64,
}

impl GearRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry with an initial set.
    pub fn with_gears(gears: GearSet) -> Result<Self, RegistryError> {
        let registry = Self::new();
        registry.replace(gears)?;
        Ok(registry)
    }

    /// Swap in `gears` as the complete monitored set. The set is validated
    /// first; on error the registry is left as it was.
    pub fn replace(&self, gears: GearSet) -> Result<(), RegistryError> {
        for gear_id in gears.keys() {
            validate_gear_id(gear_id)?;
        }

        let count = gears.len();
        let generation = {
            let mut current = self.lock();
            current.gears = Arc::new(gears);
            current.generation += 1;
            current.generation
        };
        info!("gear set replaced ({count} gear(s), generation {generation})");
        Ok(())
    }

    /// The current set. Later `replace` calls do not affect a snapshot
    /// already taken.
    pub fn snapshot(&self) -> Arc<GearSet> {
        Arc::clone(&self.lock().gears)
    }

    /// Number of successful `replace` calls so far.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn lock(&self) -> MutexGuard<'_, Current> {
        // Nothing panics while holding the lock, and the map is swapped whole,
        // so a poisoned guard still holds a consistent value.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Gear ids end up in cgroup paths and header lines, so they must be a
/// single path component.
pub fn validate_gear_id(gear_id: &str) -> Result<(), RegistryError> {
    if gear_id.is_empty() {
        return Err(RegistryError::EmptyGearId);
    }
    if gear_id.contains(|c: char| c.is_whitespace() || c == '/' || c == ':') {
        return Err(RegistryError::InvalidGearId {
            gear_id: gear_id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::thread;

    fn gears(pairs: &[(&str, &str)]) -> GearSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = GearRegistry::new();
        assert!(registry.snapshot().is_empty());
        assert_eq!(registry.generation(), 0);
    }

    #[test]
    fn test_replace_then_snapshot() {
        let registry = GearRegistry::new();
        let set = gears(&[("g1", "app1"), ("g2", "app1")]);
        registry.replace(set.clone()).unwrap();
        assert_eq!(*registry.snapshot(), set);
        assert_eq!(registry.generation(), 1);
    }

    #[test]
    fn test_replace_does_not_merge() {
        let registry = GearRegistry::with_gears(gears(&[("g1", "a"), ("g2", "b")])).unwrap();
        registry.replace(gears(&[("g3", "c")])).unwrap();
        assert_eq!(*registry.snapshot(), gears(&[("g3", "c")]));
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_replace() {
        let registry = GearRegistry::with_gears(gears(&[("g1", "a")])).unwrap();
        let before = registry.snapshot();
        registry.replace(gears(&[("g2", "b")])).unwrap();
        assert_eq!(*before, gears(&[("g1", "a")]));
    }

    #[test]
    fn test_invalid_replace_leaves_state_untouched() {
        let registry = GearRegistry::with_gears(gears(&[("g1", "a")])).unwrap();

        let err = registry
            .replace(gears(&[("ok", "a"), ("bad id", "b")]))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidGearId { ref gear_id } if gear_id == "bad id"));

        let err = registry.replace(gears(&[("", "a")])).unwrap_err();
        assert!(matches!(err, RegistryError::EmptyGearId));

        assert!(registry.replace(gears(&[("a/b", "x")])).is_err());
        assert!(registry.replace(gears(&[("a:b", "x")])).is_err());

        assert_eq!(*registry.snapshot(), gears(&[("g1", "a")]));
        assert_eq!(registry.generation(), 1);
    }

    #[test]
    fn test_replace_with_empty_set() {
        let registry = GearRegistry::with_gears(gears(&[("g1", "a")])).unwrap();
        registry.replace(GearSet::new()).unwrap();
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_concurrent_replace_leaves_one_whole_set() {
        let registry = Arc::new(GearRegistry::new());
        let candidates: Vec<GearSet> = (0..8)
            .map(|t| {
                (0..50)
                    .map(|i| (format!("t{t}-g{i}"), format!("app{t}")))
                    .collect()
            })
            .collect();

        let handles: Vec<_> = candidates
            .iter()
            .cloned()
            .map(|set| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..20 {
                        registry.replace(set.clone()).unwrap();
                        let snap = registry.snapshot();
                        assert_eq!(snap.len(), 50);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let last = registry.snapshot();
        assert!(candidates.iter().any(|c| *c == *last));
        assert_eq!(registry.generation(), 8 * 20);
    }
}
