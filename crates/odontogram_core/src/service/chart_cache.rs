//! Per-patient TTL cache of projected charts.
//!
//! The lock is held only for map access, never across database work.

use crate::model::projection::ChartProjection;
use crate::model::PatientId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct CachedChart {
    chart: ChartProjection,
    stored_at: Instant,
}

pub struct ChartCache {
    ttl: Duration,
    entries: Mutex<HashMap<PatientId, CachedChart>>,
}

impl ChartCache {
    /// A zero `ttl` disables caching: every `get` misses.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns an unexpired chart, evicting it when expired.
    pub fn get(&self, patient_id: PatientId) -> Option<ChartProjection> {
        let mut entries = self.lock();
        let fresh = entries
            .get(&patient_id)
            .map(|cached| cached.stored_at.elapsed() < self.ttl)?;
        if fresh {
            entries.get(&patient_id).map(|cached| cached.chart.clone())
        } else {
            entries.remove(&patient_id);
            None
        }
    }

    pub fn put(&self, patient_id: PatientId, chart: ChartProjection) {
        if self.ttl.is_zero() {
            return;
        }
        self.lock().insert(
            patient_id,
            CachedChart {
                chart,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, patient_id: PatientId) {
        self.lock().remove(&patient_id);
    }

    pub fn contains(&self, patient_id: PatientId) -> bool {
        self.lock().contains_key(&patient_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PatientId, CachedChart>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
