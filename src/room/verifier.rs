//! Background counter verifier.
//!
//! The denormalized room counters are authoritative for reads but must stay
//! derivable from the per-user state records. The verifier recounts every
//! room on an interval and raises an alarm on any mismatch; it never
//! rewrites counters itself (bootstrap heals them on the next deploy).

use crate::store::{CounterReconciliation, GatewayStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct CounterVerifier {
    store: Arc<dyn GatewayStore>,
}

impl CounterVerifier {
    pub fn new(store: Arc<dyn GatewayStore>) -> Self {
        Self { store }
    }

    /// Recount one room, alarming on drift.
    pub async fn verify_room(&self, room_id: &str) -> anyhow::Result<CounterReconciliation> {
        let recon = self.store.recount_room_counters(room_id).await?;
        if !recon.is_consistent() {
            error!(
                alarm = true,
                room_id,
                online_stored = recon.online.stored,
                online_recomputed = recon.online.recomputed,
                queue_stored = recon.queue.stored,
                queue_recomputed = recon.queue.recomputed,
                ready_stored = recon.ready.stored,
                ready_recomputed = recon.ready.recomputed,
                battle_stored = recon.battle.stored,
                battle_recomputed = recon.battle.recomputed,
                "room counters drifted from per-user state"
            );
        }
        Ok(recon)
    }

    /// Recount every room. Returns how many rooms drifted.
    pub async fn verify_all(&self) -> anyhow::Result<usize> {
        let mut mismatches = 0;
        for room_id in self.store.room_ids().await? {
            if !self.verify_room(&room_id).await?.is_consistent() {
                mismatches += 1;
            }
        }
        debug!(mismatches, "counter verification sweep finished");
        Ok(mismatches)
    }

    /// Sweep on an interval until cancelled.
    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "counter verifier started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("counter verifier stopped");
                    return;
                }
                () = tokio::time::sleep(interval) => {
                    if let Err(err) = self.verify_all().await {
                        error!(error = %err, "counter verification sweep failed");
                    }
                }
            }
        }
    }
}
