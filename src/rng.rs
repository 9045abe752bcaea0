//! Injectable, seedable randomness source. Every module that needs
//! randomness (the Lot Generator, the Telemetry Simulator) takes a
//! `SharedRng` rather than reaching for a thread-local generator, so a
//! fixed seed reproduces byte-identical writes (§8 property 5).

use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::sync::{Arc, Mutex};

/// A cloneable, `Send + Sync` handle to a seeded PRNG guarded by a mutex.
/// Single-threaded contention is fine here: every caller holds the lock
/// only for the duration of one `gen_range`/`gen_bool` call.
#[derive(Clone)]
pub struct SharedRng {
    inner: Arc<Mutex<StdRng>>,
}

impl SharedRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    pub fn gen_bool(&self, probability: f64) -> bool {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.gen_bool(probability.clamp(0.0, 1.0))
    }

    pub fn gen_range_f64(&self, low: f64, high: f64) -> f64 {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if (high - low).abs() < f64::EPSILON {
            low
        } else {
            guard.gen_range(low..high)
        }
    }

    pub fn gen_range_i32(&self, low: i32, high_inclusive: i32) -> i32 {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.gen_range(low..=high_inclusive)
    }

    pub fn gen_unit(&self) -> f64 {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.gen_range(0.0..1.0)
    }

    /// Gaussian sample, falling back to the mean if `std_dev` is non-positive.
    pub fn gen_gauss(&self, mean: f64, std_dev: f64) -> f64 {
        if std_dev <= 0.0 {
            return mean;
        }
        let Ok(dist) = Normal::new(mean, std_dev) else {
            return mean;
        };
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        dist.sample(&mut *guard)
    }

    /// Weighted-choice over parallel `items`/`weights` slices, mirroring the
    /// cumulative-sum-against-a-uniform-draw idiom the generator used.
    pub fn weighted_choice<'a, T>(&self, items: &'a [T], weights: &[f64]) -> Option<&'a T> {
        if items.is_empty() || items.len() != weights.len() {
            return None;
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return items.first();
        }
        let r = self.gen_range_f64(0.0, total);
        let mut cumulative = 0.0;
        for (item, weight) in items.iter().zip(weights) {
            cumulative += weight;
            if r <= cumulative {
                return Some(item);
            }
        }
        items.last()
    }

    pub fn choose<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.gen_range_i32(0, items.len() as i32 - 1) as usize;
        items.get(idx)
    }
}
