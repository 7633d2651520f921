//! Bounded-concurrency retry loop.
//!
//! Each round pushes every pending identifier onto a task queue drained by a
//! fixed pool of workers. Workers only send results back; the control loop
//! owns the pending list and the accumulated row-sets and touches them after
//! the round barrier. Identifiers that failed become the next round's queue.
//!
//! Results are appended in completion order, so row order across identifiers
//! depends on timing and is not stable between runs.

use anyhow::{Context, Result};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinSet,
    time::Instant,
};
use tracing::{debug, info, instrument, warn};

use crate::lookup::{Identifier, Lookup, LookupResult};
use crate::parse::RowSet;

/// Limits for the retry loop. `None` caps mean retry until every identifier
/// succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum simultaneous lookups.
    pub concurrency: usize,
    /// Pause after every round.
    pub pacing: Duration,
    pub max_rounds: Option<u32>,
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            concurrency: 3,
            pacing: Duration::from_secs(1),
            max_rounds: None,
            max_elapsed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GiveUpReason {
    MaxRounds { rounds: u32 },
    MaxElapsed { limit_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every identifier produced a row-set.
    Completed,
    /// A cap was hit with identifiers still pending.
    GaveUp { reason: GiveUpReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundStats {
    pub round: u32,
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct RunOutcome {
    /// Row-sets in the order they were observed, across all rounds.
    pub results: Vec<RowSet>,
    /// Identifiers still failing when the loop stopped. Empty on completion.
    pub unresolved: Vec<Identifier>,
    pub rounds: Vec<RoundStats>,
    pub status: RunStatus,
}

pub struct RetryScheduler {
    lookup: Lookup,
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(lookup: Lookup, policy: RetryPolicy) -> Self {
        Self { lookup, policy }
    }

    /// Run rounds until nothing is pending or a cap in the policy is hit.
    ///
    /// Individual lookup failures never surface as `Err`; only a panicked
    /// worker does.
    #[instrument(level = "info", skip_all, fields(ids = ids.len(), concurrency = self.policy.concurrency))]
    pub async fn run(&self, ids: Vec<Identifier>) -> Result<RunOutcome> {
        let start = Instant::now();
        let mut pending = ids;
        let mut results = Vec::new();
        let mut rounds = Vec::new();
        let mut status = RunStatus::Completed;
        let mut round = 0u32;

        while !pending.is_empty() {
            round += 1;
            let dispatched = pending.len();
            info!(round, pending = dispatched, "starting round");

            let observed = self.run_round(std::mem::take(&mut pending)).await?;

            let mut next_pending = Vec::new();
            for res in observed {
                match res {
                    LookupResult::Success { id, rows } => {
                        debug!(id = %id, round, rows = rows.len(), "lookup ok");
                        results.push(rows);
                    }
                    LookupResult::Failure { id, reason } => {
                        warn!(id = %id, round, error = %reason, "lookup failed; requeued");
                        next_pending.push(id);
                    }
                }
            }

            let stats = RoundStats {
                round,
                dispatched,
                succeeded: dispatched - next_pending.len(),
                failed: next_pending.len(),
            };
            info!(
                round,
                succeeded = stats.succeeded,
                failed = stats.failed,
                elapsed = ?start.elapsed(),
                "round complete"
            );
            rounds.push(stats);
            pending = next_pending;

            if !pending.is_empty() {
                if let Some(reason) = self.exhausted(round, start.elapsed()) {
                    warn!(unresolved = pending.len(), ?reason, "giving up");
                    status = RunStatus::GaveUp { reason };
                    break;
                }
            }

            tokio::time::sleep(self.policy.pacing).await;
        }

        Ok(RunOutcome {
            results,
            unresolved: pending,
            rounds,
            status,
        })
    }

    fn exhausted(&self, round: u32, elapsed: Duration) -> Option<GiveUpReason> {
        if let Some(max) = self.policy.max_rounds {
            if round >= max {
                return Some(GiveUpReason::MaxRounds { rounds: round });
            }
        }
        if let Some(limit) = self.policy.max_elapsed {
            if elapsed >= limit {
                return Some(GiveUpReason::MaxElapsed {
                    limit_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }
        None
    }

    /// Dispatch one lookup per identifier through a pool of at most
    /// `concurrency` workers and wait for all of them.
    async fn run_round(&self, pending: Vec<Identifier>) -> Result<Vec<LookupResult>> {
        let total = pending.len();
        let (task_tx, task_rx) = mpsc::unbounded_channel::<Identifier>();
        for id in pending {
            task_tx.send(id).context("queueing lookup")?;
        }
        // closed queue lets idle workers exit
        drop(task_tx);
        let task_rx = Arc::new(Mutex::new(task_rx));

        let (res_tx, mut res_rx) = mpsc::unbounded_channel::<LookupResult>();
        let workers = self.policy.concurrency.clamp(1, total.max(1));
        let mut pool = JoinSet::new();

        for worker in 0..workers {
            let task_rx = Arc::clone(&task_rx);
            let res_tx = res_tx.clone();
            let lookup = self.lookup.clone();

            pool.spawn(async move {
                loop {
                    let next = task_rx.lock().await.recv().await;
                    let Some(id) = next else { break };
                    debug!(worker, id = %id, "dispatch");
                    if res_tx.send(lookup.run(id).await).is_err() {
                        break;
                    }
                }
            });
        }
        drop(res_tx);

        let mut observed = Vec::with_capacity(total);
        while let Some(res) = res_rx.recv().await {
            observed.push(res);
        }

        while let Some(joined) = pool.join_next().await {
            joined.context("lookup worker panicked")?;
        }

        Ok(observed)
    }
}
