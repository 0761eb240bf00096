//! Background sweeps
//!
//! Three independent periodic tasks, each on its own monotonic interval:
//! - approval timeouts (`approval.sweep_interval_seconds`)
//! - verdict cache eviction (`cache.sweep_interval_seconds`)
//! - audit retention (`audit.retention_sweep_interval_seconds`)
//!
//! They run regardless of request volume and stop when the sweeper's
//! [`CancellationToken`] is cancelled.

use chrono::Utc;
use nestguard_audit::AuditLog;
use nestguard_core::GuardSpec;
use nestguard_filter::ValidationCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::approval::ApprovalWorkflow;
use crate::gateway::SafetyGateway;

/// Handle to the running sweep tasks
pub struct Sweeper {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Sweeper {
    /// Start the sweeps for a gateway
    pub fn start(gateway: &SafetyGateway, spec: &GuardSpec) -> Self {
        Self::start_parts(
            gateway.approval().clone(),
            gateway.cache().clone(),
            gateway.audit_log().clone(),
            spec,
        )
    }

    /// Start the sweeps over individual components
    pub fn start_parts(
        approval: Arc<ApprovalWorkflow>,
        cache: Arc<ValidationCache>,
        audit: Arc<AuditLog>,
        spec: &GuardSpec,
    ) -> Self {
        let token = CancellationToken::new();
        let retention = spec.audit.retention();

        let handles = vec![
            spawn_periodic("approval", spec.approval.sweep_interval(), token.clone(), move || {
                let expired = approval.sweep_expired(Utc::now());
                if !expired.is_empty() {
                    debug!(count = expired.len(), "approval sweep");
                }
            }),
            spawn_periodic("cache", spec.cache.sweep_interval(), token.clone(), move || {
                cache.sweep();
            }),
            spawn_periodic(
                "audit-retention",
                spec.audit.retention_sweep_interval(),
                token.clone(),
                move || {
                    audit.purge(Utc::now() - retention);
                },
            ),
        ];

        info!(tasks = handles.len(), "safety sweeper started");
        Self { token, handles }
    }

    /// Token that stops every task when cancelled
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the tasks and wait for them to finish
    pub async fn shutdown(mut self) {
        self.token.cancel();
        for handle in std::mem::take(&mut self.handles) {
            // A task that panicked has nothing left to clean up
            let _ = handle.await;
        }
        info!("safety sweeper stopped");
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn spawn_periodic<F>(
    name: &'static str,
    period: Duration,
    token: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(10)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(task = name, "sweep task cancelled");
                    break;
                }
                _ = interval.tick() => tick(),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exceptions::ExceptionStore;
    use nestguard_core::{AgeGroup, ApprovalSettings, ReviewStatus, RiskLevel};

    #[tokio::test(start_paused = true)]
    async fn test_approval_sweep_runs_on_interval() {
        let mut spec = GuardSpec::default();
        spec.approval = ApprovalSettings {
            timeout_seconds: 0,
            sweep_interval_seconds: 5,
            ..Default::default()
        };

        let audit = Arc::new(AuditLog::new(100));
        let approval = Arc::new(ApprovalWorkflow::new(
            spec.approval.clone(),
            Arc::new(ExceptionStore::new()),
            audit.clone(),
        ));
        let req = approval.request_review("kid", AgeGroup::Child, "x", Vec::new(), RiskLevel::Low);

        let sweeper = Sweeper::start_parts(
            approval.clone(),
            Arc::new(ValidationCache::default()),
            audit,
            &spec,
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(approval.get(&req.id).unwrap().status, ReviewStatus::Expired);

        sweeper.shutdown().await;
    }
}
