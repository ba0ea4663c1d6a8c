//! Pool state machine and health-tracked selection
//!
//! Per-credential status transitions:
//! - Available → Quarantined (auth failure; permanent for the process)
//! - Available → CoolingDown (rate limited; until the vendor's reset time)
//! - CoolingDown → Available (cooldown expired, checked at selection time)
//!
//! All state lives behind one `RwLock`; `select` and `report` both take the
//! write lock so recency stamping and health transitions are atomic with
//! respect to each other.

use std::time::Instant;

use forge_auth::Credential;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::strategy::{Candidate, LeastRecentlyUsed, SelectionStrategy};

/// Runtime status of a pooled credential.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CredentialStatus {
    Available,
    CoolingDown { until: Instant },
    Quarantined,
}

impl CredentialStatus {
    /// Status label for health reporting and logging.
    pub fn label(&self) -> &'static str {
        match self {
            CredentialStatus::Available => "available",
            CredentialStatus::CoolingDown { .. } => "cooling_down",
            CredentialStatus::Quarantined => "quarantined",
        }
    }
}

/// Request outcome reported back to the pool.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    /// Call completed; clears the failure streak.
    Success,
    /// Credential rejected (401/403 without throttle markers); permanent.
    AuthFailure,
    /// Credential throttled; selectable again once `until` passes.
    RateLimited { until: Instant },
}

#[derive(Debug)]
struct HealthSlot {
    status: CredentialStatus,
    last_used_at: Option<Instant>,
    consecutive_failures: u32,
}

impl HealthSlot {
    fn new() -> Self {
        Self {
            status: CredentialStatus::Available,
            last_used_at: None,
            consecutive_failures: 0,
        }
    }
}

/// Aggregate pool health for operational visibility.
#[derive(Debug, Clone, Serialize)]
pub struct PoolHealth {
    /// "healthy" (all selectable), "degraded" (some), or "exhausted" (none).
    pub status: &'static str,
    pub total: usize,
    pub available: usize,
    pub cooling_down: usize,
    pub quarantined: usize,
    pub credentials: Vec<CredentialHealth>,
}

/// Per-credential health entry.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialHealth {
    pub id: String,
    pub status: &'static str,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
}

/// Health-tracked rotation over the configured credentials.
pub struct CredentialPool {
    credentials: Vec<Credential>,
    health: RwLock<Vec<HealthSlot>>,
    strategy: Box<dyn SelectionStrategy>,
}

impl CredentialPool {
    /// Pool with an explicit selection strategy.
    pub fn new(credentials: Vec<Credential>, strategy: Box<dyn SelectionStrategy>) -> Self {
        let health = credentials.iter().map(|_| HealthSlot::new()).collect();
        info!(credentials = credentials.len(), "credential pool initialized");
        Self {
            credentials,
            health: RwLock::new(health),
            strategy,
        }
    }

    /// Pool with the default least-recently-used strategy.
    pub fn with_default_strategy(credentials: Vec<Credential>) -> Self {
        Self::new(credentials, Box::new(LeastRecentlyUsed))
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Select a credential for a request.
    ///
    /// Expired cooldowns transition back to Available inside the lock, and
    /// credentials whose own expiry has passed (an OAuth token nobody
    /// refreshed) are skipped rather than handed out to fail. The chosen
    /// slot's recency is stamped before the lock is released, so concurrent
    /// selectors never agree on the same least-recently-used credential.
    /// Fails with `Exhausted` when nothing is selectable.
    pub async fn select(&self) -> Result<Credential> {
        let mut health = self.health.write().await;
        let now = Instant::now();
        let now_millis = forge_auth::now_millis();

        for (index, slot) in health.iter_mut().enumerate() {
            if let CredentialStatus::CoolingDown { until } = slot.status
                && now >= until
            {
                info!(
                    credential_id = self.credentials[index].id(),
                    "cooldown expired, credential available again"
                );
                slot.status = CredentialStatus::Available;
            }
        }

        let candidates: Vec<Candidate> = health
            .iter()
            .enumerate()
            .filter(|(index, slot)| {
                slot.status == CredentialStatus::Available
                    && !self.credentials[*index].is_expired(now_millis)
            })
            .map(|(index, slot)| Candidate {
                index,
                last_used_at: slot.last_used_at,
            })
            .collect();

        let Some(index) = self.strategy.pick(&candidates) else {
            let message = exhausted_message(&health, now);
            return Err(Error::Exhausted(message));
        };

        health[index].last_used_at = Some(now);
        let credential = self.credentials[index].clone();
        debug!(credential_id = credential.id(), "credential selected");
        Ok(credential)
    }

    /// Report a request outcome, driving health transitions.
    ///
    /// Unknown credential ids are logged and ignored; by the time an outcome
    /// arrives the caller may race a reconfigured pool and there is nothing
    /// useful to do with the report.
    pub async fn report(&self, credential_id: &str, outcome: Outcome) {
        let Some(index) = self
            .credentials
            .iter()
            .position(|c| c.id() == credential_id)
        else {
            warn!(credential_id, "outcome reported for unknown credential");
            return;
        };

        let mut health = self.health.write().await;
        let slot = &mut health[index];
        match outcome {
            Outcome::Success => {
                slot.consecutive_failures = 0;
            }
            Outcome::AuthFailure => {
                warn!(credential_id, "credential quarantined (auth failure)");
                slot.status = CredentialStatus::Quarantined;
                slot.consecutive_failures += 1;
            }
            Outcome::RateLimited { until } => {
                let cooldown_secs = until.saturating_duration_since(Instant::now()).as_secs();
                info!(
                    credential_id,
                    cooldown_secs, "credential cooling down (rate limited)"
                );
                slot.status = CredentialStatus::CoolingDown { until };
                slot.consecutive_failures += 1;
            }
        }
    }

    /// Health snapshot for the operational surface.
    pub async fn health(&self) -> PoolHealth {
        let health = self.health.read().await;
        let now = Instant::now();

        let mut available = 0usize;
        let mut cooling_down = 0usize;
        let mut quarantined = 0usize;
        let mut credentials = Vec::with_capacity(self.credentials.len());

        for (credential, slot) in self.credentials.iter().zip(health.iter()) {
            // A cooldown that already elapsed counts as available even though
            // the transition is applied lazily at selection time.
            let (status, remaining) = match slot.status {
                CredentialStatus::Available => (CredentialStatus::Available, None),
                CredentialStatus::CoolingDown { until } if now >= until => {
                    (CredentialStatus::Available, None)
                }
                CredentialStatus::CoolingDown { until } => (
                    slot.status,
                    Some(until.saturating_duration_since(now).as_secs()),
                ),
                CredentialStatus::Quarantined => (CredentialStatus::Quarantined, None),
            };
            match status {
                CredentialStatus::Available => available += 1,
                CredentialStatus::CoolingDown { .. } => cooling_down += 1,
                CredentialStatus::Quarantined => quarantined += 1,
            }
            credentials.push(CredentialHealth {
                id: credential.id().to_string(),
                status: status.label(),
                consecutive_failures: slot.consecutive_failures,
                cooldown_remaining_secs: remaining,
            });
        }

        let total = self.credentials.len();
        let status = if available == total && total > 0 {
            "healthy"
        } else if available > 0 {
            "degraded"
        } else {
            "exhausted"
        };

        PoolHealth {
            status,
            total,
            available,
            cooling_down,
            quarantined,
            credentials,
        }
    }
}

/// Availability counts folded into the exhaustion error message.
fn exhausted_message(health: &[HealthSlot], now: Instant) -> String {
    let total = health.len();
    let mut cooling = 0usize;
    let mut quarantined = 0usize;
    for slot in health {
        match slot.status {
            CredentialStatus::CoolingDown { until } if now < until => cooling += 1,
            CredentialStatus::CoolingDown { .. } | CredentialStatus::Available => {}
            CredentialStatus::Quarantined => quarantined += 1,
        }
    }
    format!(
        "no selectable credentials ({total} total, {cooling} cooling down, {quarantined} quarantined)"
    )
}
