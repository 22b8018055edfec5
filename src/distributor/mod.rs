//! Fair-share search distribution
//!
//! This module turns per-server candidate lists into a bounded list of
//! search assignments and executes them.
//!
//! # Round-robin
//!
//! ```text
//!  limit = 5          cursor
//!  Radarr1  [a1 a2 a3 a4 ...]   ──▶ a1      a2      a3
//!  Radarr2  [b1 b2 ...]         ──▶    b1      b2
//!
//!  output:  a1 b1 a2 b2 a3
//! ```
//!
//! Servers are visited in the order given; each visit takes the next unread
//! item from that server. Exhausted servers leave the rotation. The first
//! server in rotation absorbs the odd remainder.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, ClientFactory, MediaServerClient};
use crate::models::{Assignment, Category, Item, ServerId, ServerRef};

// ============================================================================
// Distribution
// ============================================================================

/// Candidate items offered by one server for one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCandidates {
    pub server: ServerRef,
    pub items: Vec<Item>,
}

impl ServerCandidates {
    pub fn new(server: ServerRef, items: Vec<Item>) -> Self {
        Self { server, items }
    }
}

/// Pick up to `limit` assignments across servers by round-robin
///
/// `candidates` must already be in rotation order. Servers that do not serve
/// `category` are ignored. Output length is `min(limit, total candidates)`
/// and the result is fully determined by the inputs.
pub fn distribute(
    category: Category,
    limit: usize,
    candidates: &[ServerCandidates],
) -> Vec<Assignment> {
    let eligible: Vec<&ServerCandidates> = candidates
        .iter()
        .filter(|c| c.server.serves(category))
        .collect();

    let total: usize = eligible.iter().map(|c| c.items.len()).sum();
    let mut assignments = Vec::with_capacity(limit.min(total));

    let mut cursors = vec![0usize; eligible.len()];
    let mut active: Vec<usize> = (0..eligible.len())
        .filter(|&i| !eligible[i].items.is_empty())
        .collect();

    while assignments.len() < limit && !active.is_empty() {
        for &i in &active {
            if assignments.len() >= limit {
                break;
            }
            let source = eligible[i];
            assignments.push(Assignment {
                category,
                server: source.server.clone(),
                item: source.items[cursors[i]].clone(),
            });
            cursors[i] += 1;
        }
        active.retain(|&i| cursors[i] < eligible[i].items.len());
    }

    assignments
}

// ============================================================================
// Execution
// ============================================================================

/// Outcome of one assignment
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub assignment: Assignment,
    pub result: Result<(), ClientError>,
}

impl SearchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregate counts for one (server, category) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTally {
    pub server: ServerRef,
    pub category: Category,
    pub triggered: usize,
    pub failed: usize,
}

/// Result of executing a batch of assignments
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// One entry per attempted assignment, in execution order
    pub outcomes: Vec<SearchOutcome>,
    /// Per-(server, category) counts, in first-seen order
    pub tallies: Vec<SearchTally>,
    /// Assignments not completed because the cycle was cancelled, including
    /// a search interrupted mid-call
    pub not_attempted: usize,
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn triggered(&self) -> usize {
        self.tallies.iter().map(|t| t.triggered).sum()
    }

    pub fn failed(&self) -> usize {
        self.tallies.iter().map(|t| t.failed).sum()
    }

    fn record(&mut self, outcome: SearchOutcome) {
        let failed = !outcome.is_ok();
        let server_id = outcome.assignment.server.id;
        let category = outcome.assignment.category;

        let position = self
            .tallies
            .iter()
            .position(|t| t.server.id == server_id && t.category == category);
        let tally = match position {
            Some(index) => &mut self.tallies[index],
            None => {
                self.tallies.push(SearchTally {
                    server: outcome.assignment.server.clone(),
                    category,
                    triggered: 0,
                    failed: 0,
                });
                let last = self.tallies.len() - 1;
                &mut self.tallies[last]
            }
        };

        if failed {
            tally.failed += 1;
        } else {
            tally.triggered += 1;
        }
        self.outcomes.push(outcome);
    }
}

/// Executes search assignments against media servers
pub struct Distributor {
    factory: Arc<dyn ClientFactory>,
}

impl Distributor {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self { factory }
    }

    /// Trigger a search for every assignment in order
    ///
    /// Individual failures are recorded and do not stop the batch. Once the
    /// token fires no new searches are issued and a search still in flight is
    /// abandoned; it counts as not attempted. In dry-run mode no client is
    /// contacted and every assignment counts as triggered.
    pub async fn execute(
        &self,
        assignments: &[Assignment],
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let mut clients: HashMap<ServerId, Result<Arc<dyn MediaServerClient>, ClientError>> =
            HashMap::new();

        for (index, assignment) in assignments.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.not_attempted = assignments.len() - index;
                tracing::info!(
                    remaining = report.not_attempted,
                    "Cancelled, remaining searches not issued"
                );
                break;
            }

            let result = if dry_run {
                tracing::debug!(
                    server = %assignment.server.name,
                    item = %assignment.item.title,
                    "Dry run, search not sent"
                );
                Ok(())
            } else {
                let client = clients
                    .entry(assignment.server.id)
                    .or_insert_with(|| self.factory.client_for(&assignment.server));
                match client {
                    Ok(client) => {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                report.cancelled = true;
                                report.not_attempted = assignments.len() - index;
                                tracing::info!(
                                    server = %assignment.server.name,
                                    item_id = assignment.item.id,
                                    remaining = report.not_attempted,
                                    "Cancelled during search, remaining searches not issued"
                                );
                                break;
                            }
                            result = client.trigger_search(&assignment.item) => result,
                        }
                    }
                    Err(e) => Err(e.clone()),
                }
            };

            if let Err(e) = &result {
                tracing::warn!(
                    server = %assignment.server.name,
                    category = %assignment.category,
                    item_id = assignment.item.id,
                    error = %e,
                    "Search trigger failed"
                );
            }

            report.record(SearchOutcome {
                assignment: assignment.clone(),
                result,
            });
        }

        report
    }
}
