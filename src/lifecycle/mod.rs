//! Lifecycle Processor: advances QUEUED lots to RUNNING when their
//! equipment is IDLE, and RUNNING lots to COMPLETED once elapsed time
//! meets the estimated duration. Runs as a background tick loop and is
//! also driven directly by tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::domain::LotStatus;
use crate::repository::{LotFilter, SharedRepository};

#[derive(Debug, Default)]
pub struct LifecycleStats {
    pub started: AtomicU64,
    pub completed: AtomicU64,
    pub ticks: AtomicU64,
}

pub struct LifecycleProcessor {
    repo: SharedRepository,
    clock: SharedClock,
    running: AtomicBool,
    pub stats: LifecycleStats,
}

impl LifecycleProcessor {
    pub fn new(repo: SharedRepository, clock: SharedClock) -> Self {
        Self {
            repo,
            clock,
            running: AtomicBool::new(false),
            stats: LifecycleStats::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Reconcile RUNNING lots on startup: any lot already past its
    /// estimated completion is completed immediately rather than waiting
    /// for the next tick, so a restart doesn't leave stale RUNNING rows.
    pub async fn reconcile_on_startup(&self) -> anyhow::Result<()> {
        let running_lots = self
            .repo
            .list_lots(&LotFilter {
                status: Some(LotStatus::Running),
                priority: None,
                hot_lot_only: false,
            })
            .await?;
        let now = self.clock.now();
        for lot in running_lots {
            if let Some(elapsed) = lot.elapsed_minutes(now) {
                if elapsed >= i64::from(lot.estimated_duration_minutes) {
                    match self.repo.complete_lot(lot.id, now).await {
                        Ok(Some(_)) => info!(lot_id = %lot.id, "reconciled overdue lot to COMPLETED on startup"),
                        Ok(None) => {}
                        Err(err) => warn!(lot_id = %lot.id, %err, "failed to reconcile lot on startup"),
                    }
                }
            }
        }
        Ok(())
    }

    async fn process_queued_to_running(&self) {
        let now = self.clock.now();
        let queued = match self
            .repo
            .list_lots(&LotFilter {
                status: Some(LotStatus::Queued),
                priority: None,
                hot_lot_only: false,
            })
            .await
        {
            Ok(lots) => lots,
            Err(err) => {
                warn!(%err, "failed to list queued lots");
                return;
            }
        };

        for lot in queued {
            match self.repo.start_lot(lot.id, now).await {
                Ok(Some(_)) => {
                    self.stats.started.fetch_add(1, Ordering::Relaxed);
                    info!(lot_id = %lot.id, "started lot");
                }
                Ok(None) => debug!(lot_id = %lot.id, "lot not yet startable"),
                Err(err) => warn!(lot_id = %lot.id, %err, "failed to start lot"),
            }
        }
    }

    async fn process_running_to_completed(&self) {
        let now = self.clock.now();
        let running = match self
            .repo
            .list_lots(&LotFilter {
                status: Some(LotStatus::Running),
                priority: None,
                hot_lot_only: false,
            })
            .await
        {
            Ok(lots) => lots,
            Err(err) => {
                warn!(%err, "failed to list running lots");
                return;
            }
        };

        for lot in running {
            let Some(elapsed) = lot.elapsed_minutes(now) else {
                continue;
            };
            if elapsed < i64::from(lot.estimated_duration_minutes) {
                continue;
            }
            match self.repo.complete_lot(lot.id, now).await {
                Ok(Some(_)) => {
                    self.stats.completed.fetch_add(1, Ordering::Relaxed);
                    info!(lot_id = %lot.id, "completed lot");
                }
                Ok(None) => debug!(lot_id = %lot.id, "lot already transitioned by another writer"),
                Err(err) => warn!(lot_id = %lot.id, %err, "failed to complete lot"),
            }
        }
    }

    async fn tick(&self) {
        self.process_queued_to_running().await;
        self.process_running_to_completed().await;
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Run the tick loop until `token` is cancelled. A graceful stop
    /// completes the in-flight tick but never starts a new one.
    pub async fn run(self: Arc<Self>, interval_secs: u64, token: CancellationToken) {
        self.running.store(true, Ordering::Relaxed);
        info!("lifecycle processor started");
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }
        self.running.store(false, Ordering::Relaxed);
        info!("lifecycle processor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClock;
    use crate::domain::EquipmentStatus;
    use crate::repository::{demo_equipment, InMemoryRepository, NewLot};
    use std::sync::Arc;

    #[tokio::test]
    async fn completes_lot_after_estimated_duration_scenario_c() {
        let repo = Arc::new(InMemoryRepository::new());
        let clock = SimClock::new(Utc::now());
        let eq = demo_equipment("Ex", crate::domain::EquipmentKind::Lithography, 0.9, clock.now());
        let eq_id = eq.id;
        repo.seed_equipment(eq);

        let lot = repo
            .create_lot(
                NewLot {
                    name: "Lx".into(),
                    wafer_count: 25,
                    priority: 1,
                    hot_lot: false,
                    recipe_kind: "lithography".into(),
                    customer_tag: None,
                    deadline: None,
                    estimated_duration_minutes: 60,
                },
                clock.now(),
            )
            .await
            .unwrap();

        repo.apply_dispatch_batch(
            &[crate::repository::DispatchAssignment {
                lot_id: lot.id,
                equipment_id: eq_id,
                reason: "test".into(),
                score: 1.0,
            }],
            clock.now(),
        )
        .await
        .unwrap();

        let shared_clock: SharedClock = Arc::new(clock.clone());
        let processor = LifecycleProcessor::new(repo.clone(), shared_clock);
        processor.tick().await;
        let started_lot = repo.get_lot(lot.id).await.unwrap();
        assert_eq!(started_lot.status, LotStatus::Running);

        clock.advance(chrono::Duration::minutes(60) + chrono::Duration::seconds(1));
        processor.tick().await;

        let completed_lot = repo.get_lot(lot.id).await.unwrap();
        assert_eq!(completed_lot.status, LotStatus::Completed);
        let equipment = repo.get_equipment(eq_id).await.unwrap();
        assert_eq!(equipment.status, EquipmentStatus::Idle);
        assert_eq!(equipment.current_lot_id, None);
        assert_eq!(equipment.total_wafers_processed, 25);
    }

    use chrono::Utc;
}
