//! Background TTL sweep.
//!
//! Expired entries are already invisible to readers; the sweeper only
//! reclaims their memory between requests.

use crate::layer::CacheLayer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Counters for the sweeper's lifetime.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    pub sweeps: AtomicU64,
    pub row_sets_expired: AtomicU64,
    pub value_sets_expired: AtomicU64,
}

impl SweepMetrics {
    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            row_sets_expired: self.row_sets_expired.load(Ordering::Relaxed),
            value_sets_expired: self.value_sets_expired.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSnapshot {
    pub sweeps: u64,
    pub row_sets_expired: u64,
    pub value_sets_expired: u64,
}

/// Sweep both stores every `every` until `shutdown_rx` turns `true`.
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(sweep_task(layer.clone(), config.sweep_interval, shutdown_rx));
/// // ...
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn sweep_task(
    layer: CacheLayer,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics> {
    let metrics = Arc::new(SweepMetrics::default());

    // `interval` panics on a zero period.
    let mut ticker = interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = every.as_secs(), "Cache sweeper started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also ends the task.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Cache sweeper shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                let report = layer.sweep();
                metrics.sweeps.fetch_add(1, Ordering::Relaxed);
                metrics.row_sets_expired.fetch_add(report.row_sets, Ordering::Relaxed);
                metrics.value_sets_expired.fetch_add(report.value_sets, Ordering::Relaxed);
                if report.row_sets > 0 || report.value_sets > 0 {
                    tracing::debug!(
                        row_sets = report.row_sets,
                        value_sets = report.value_sets,
                        "Swept expired cache entries"
                    );
                } else {
                    tracing::trace!("Sweep found nothing expired");
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        row_sets_expired = snapshot.row_sets_expired,
        value_sets_expired = snapshot.value_sets_expired,
        "Cache sweeper completed"
    );

    metrics
}
