//! Lot Generator: autonomously maintains a minimum backlog of PENDING
//! lots, matching the fab's natural intake rate rather than waiting for
//! external job submission.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::config::GeneratorConfig;
use crate::domain::GenerationLogEntry;
use crate::repository::{NewLot, SharedRepository};
use crate::rng::SharedRng;

const PRIORITIES: [i16; 5] = [1, 2, 3, 4, 5];

#[derive(Debug, Default)]
pub struct GeneratorStats {
    pub generated: AtomicU64,
    pub runs: AtomicU64,
}

pub struct LotGenerator {
    repo: SharedRepository,
    clock: SharedClock,
    rng: SharedRng,
    pub stats: GeneratorStats,
}

impl LotGenerator {
    pub fn new(repo: SharedRepository, clock: SharedClock, rng: SharedRng) -> Self {
        Self {
            repo,
            clock,
            rng,
            stats: GeneratorStats::default(),
        }
    }

    /// Smallest sequence not already used by today's autogenerated names
    /// with this prefix, starting at 1001 on first use per day.
    async fn next_sequence(&self, prefix: &str, now: chrono::DateTime<Utc>) -> anyhow::Result<i64> {
        let today_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is a valid time")
            .and_utc();
        Ok(self.repo.next_lot_sequence(prefix, today_start).await?)
    }

    fn select_priority(&self, cfg: &GeneratorConfig, is_hot_lot: bool) -> i16 {
        if is_hot_lot {
            return 1;
        }
        let weights: Vec<f64> = cfg.priority_distribution.to_vec();
        self.rng
            .weighted_choice(&PRIORITIES, &weights)
            .copied()
            .unwrap_or(3)
    }

    fn select_customer(&self, cfg: &GeneratorConfig) -> String {
        let names: Vec<String> = cfg.customer_weights.iter().map(|(n, _)| n.clone()).collect();
        let weights: Vec<f64> = cfg.customer_weights.iter().map(|(_, w)| *w).collect();
        self.rng
            .weighted_choice(&names, &weights)
            .cloned()
            .unwrap_or_else(|| "INTERNAL".to_string())
    }

    fn select_recipe(&self, cfg: &GeneratorConfig) -> String {
        self.rng
            .choose(&cfg.recipe_kinds)
            .cloned()
            .unwrap_or_else(|| "STANDARD_LOGIC".to_string())
    }

    fn wafer_count_for_priority(&self, priority: i16) -> i32 {
        match priority {
            1 => 25,
            2 => self.rng.gen_range_i32(20, 50),
            3 => self.rng.gen_range_i32(50, 100),
            4 => self.rng.gen_range_i32(100, 200),
            5 => self.rng.gen_range_i32(150, 300),
            _ => 50,
        }
    }

    fn deadline_days_for_priority(&self, priority: i16) -> f64 {
        match priority {
            1 => self.rng.gen_range_f64(1.0, 2.0),
            2 => self.rng.gen_range_f64(2.0, 4.0),
            3 => self.rng.gen_range_f64(3.0, 7.0),
            4 => self.rng.gen_range_f64(5.0, 10.0),
            5 => self.rng.gen_range_f64(7.0, 14.0),
            _ => 7.0,
        }
    }

    async fn lot_name(&self, is_hot_lot: bool, now: chrono::DateTime<Utc>) -> anyhow::Result<String> {
        let year = now.format("%Y");
        let prefix = if is_hot_lot { "HOT-AUTO" } else { "AUTO" };
        let name_prefix = format!("{prefix}-{year}-");
        let seq = self.next_sequence(&name_prefix, now).await?;
        Ok(format!("{name_prefix}{seq:04}"))
    }

    /// Generate one lot and append its provenance to the generation log.
    /// Failure here never aborts a batch: the caller logs and continues
    /// with the next lot (§4.2, per-lot independence).
    pub async fn generate_one(&self, cfg: &GeneratorConfig, triggered_by: &str) -> anyhow::Result<()> {
        let now = self.clock.now();
        let is_hot_lot = self.rng.gen_bool(cfg.hot_lot_probability);
        let priority = self.select_priority(cfg, is_hot_lot);
        let customer = self.select_customer(cfg);
        let recipe_kind = self.select_recipe(cfg);
        let wafer_count = self.wafer_count_for_priority(priority);
        let deadline_days = self.deadline_days_for_priority(priority);
        let deadline = now + chrono::Duration::seconds((deadline_days * 86400.0) as i64);
        let estimated_duration_minutes = 60 + self.rng.gen_range_i32(0, 600);
        let name = self.lot_name(is_hot_lot, now).await?;

        let lot = self
            .repo
            .create_lot(
                NewLot {
                    name: name.clone(),
                    wafer_count,
                    priority,
                    hot_lot: is_hot_lot,
                    recipe_kind,
                    customer_tag: Some(customer.clone()),
                    deadline: Some(deadline),
                    estimated_duration_minutes,
                },
                now,
            )
            .await?;

        let snapshot = serde_json::json!({
            "hot_lot_probability": cfg.hot_lot_probability,
            "priority_distribution": cfg.priority_distribution,
        });
        self.repo
            .log_generation(GenerationLogEntry {
                id: uuid::Uuid::new_v4(),
                lot_id: lot.id,
                reason: "autonomous".to_string(),
                triggered_by: triggered_by.to_string(),
                config_snapshot: snapshot,
                created_at: now,
            })
            .await?;

        self.stats.generated.fetch_add(1, Ordering::Relaxed);
        info!(lot = %name, customer, "generated autonomous lot");
        Ok(())
    }

    /// Top the backlog up to `min_lots`, generating at most `batch_size`
    /// lots in one pass even if the shortfall is larger.
    pub async fn generate_if_needed(&self, cfg: &GeneratorConfig) -> anyhow::Result<usize> {
        let active = self.repo.count_active_lots().await?;
        if active >= cfg.min_lots {
            return Ok(0);
        }
        let shortfall = (cfg.min_lots - active).min(cfg.batch_size as i64).max(0);
        let mut generated = 0usize;
        for _ in 0..shortfall {
            let active_now = self.repo.count_active_lots().await?;
            if active_now >= cfg.max_lots {
                warn!("backlog at max_lots, skipping remaining generation this pass");
                break;
            }
            match self.generate_one(cfg, "scheduler").await {
                Ok(()) => generated += 1,
                Err(err) => warn!(%err, "failed to generate lot, continuing"),
            }
        }
        self.stats.runs.fetch_add(1, Ordering::Relaxed);
        Ok(generated)
    }

    pub async fn run(self: Arc<Self>, cfg: GeneratorConfig, token: CancellationToken) {
        if !cfg.enabled {
            info!("lot generator disabled by configuration");
            return;
        }
        info!("lot generator started");
        let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.generate_if_needed(&cfg).await {
                        warn!(%err, "generation pass failed");
                    }
                }
            }
        }
        info!("lot generator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClock;
    use crate::repository::InMemoryRepository;

    fn test_generator() -> LotGenerator {
        let repo: SharedRepository = Arc::new(InMemoryRepository::new());
        let clock: SharedClock = Arc::new(SimClock::new(Utc::now()));
        let rng = SharedRng::from_seed(7);
        LotGenerator::new(repo, clock, rng)
    }

    #[tokio::test]
    async fn hot_lots_always_get_priority_one() {
        let generator = test_generator();
        let cfg = GeneratorConfig::default();
        for _ in 0..20 {
            generator.generate_one(&cfg, "test").await.unwrap();
        }
        let lots = generator.repo.list_lots(&Default::default()).await.unwrap();
        for lot in lots {
            if lot.hot_lot {
                assert_eq!(lot.priority, 1);
            }
        }
    }

    #[tokio::test]
    async fn generates_unique_sequential_names() {
        let generator = test_generator();
        let cfg = GeneratorConfig::default();
        for _ in 0..10 {
            generator.generate_one(&cfg, "test").await.unwrap();
        }
        let lots = generator.repo.list_lots(&Default::default()).await.unwrap();
        let mut names: Vec<String> = lots.iter().map(|l| l.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), lots.len(), "lot names must be unique");
    }

    #[tokio::test]
    async fn sequence_survives_a_restart_against_the_same_store() {
        let repo: SharedRepository = Arc::new(InMemoryRepository::new());
        let now = Utc::now();
        let clock: SharedClock = Arc::new(SimClock::new(now));
        let cfg = GeneratorConfig::default();

        let first = LotGenerator::new(repo.clone(), clock.clone(), SharedRng::from_seed(1));
        for _ in 0..5 {
            first.generate_one(&cfg, "test").await.unwrap();
        }

        // A fresh generator instance, as after a process restart, must not
        // repeat a name already used today against the same repository.
        let second = LotGenerator::new(repo.clone(), clock, SharedRng::from_seed(2));
        second.generate_one(&cfg, "test").await.unwrap();

        let lots = repo.list_lots(&Default::default()).await.unwrap();
        let mut names: Vec<String> = lots.iter().map(|l| l.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), lots.len(), "a restarted generator must not reuse a sequence number");
    }

    #[tokio::test]
    async fn stops_generating_once_min_lots_reached() {
        let generator = test_generator();
        let cfg = GeneratorConfig {
            min_lots: 5,
            batch_size: 20,
            max_lots: 50,
            ..GeneratorConfig::default()
        };
        let generated = generator.generate_if_needed(&cfg).await.unwrap();
        assert_eq!(generated, 5);
        let generated_again = generator.generate_if_needed(&cfg).await.unwrap();
        assert_eq!(generated_again, 0);
    }
}
