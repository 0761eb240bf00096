//! Approval Workflow - Parental review of blocked content
//!
//! Requests move `pending -> approved | rejected | expired` and never leave a
//! terminal state. Every transition writes an audit entry and notifies
//! listeners. Approval (or auto-approval on expiry) grants the user a
//! bounded [`SafetyException`](nestguard_core::SafetyException) for exactly
//! the reviewed content.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use nestguard_audit::AuditLog;
use nestguard_core::review::excerpt;
use nestguard_core::{
    AgeGroup, ApprovalSettings, AuditEventType, ExpiryPolicy, GuardError, GuardResult,
    NotificationHub, ParentResponse, ParentalReviewRequest, ReviewDecision, ReviewPriority,
    ReviewStatus, RiskLevel, SafetyAuditEntry, SafetyEvent, Violation,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::exceptions::{ExceptionGrant, ExceptionStore};

/// Characters of content carried in notifications
pub const EXCERPT_CHARS: usize = 80;

/// Approver recorded for decisions made by the expiry sweep
pub const SYSTEM_APPROVER: &str = "system";

/// A parent's answer to a review request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionInput {
    pub approved: bool,
    pub reason: String,
    pub approver: String,
    /// Overrides the default exception lifetime on approval
    pub exception_duration_secs: Option<u64>,
}

impl DecisionInput {
    pub fn approve(reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            reason: reason.into(),
            approver: "parent".to_string(),
            exception_duration_secs: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            ..Self::approve(reason)
        }
    }

    pub fn with_approver(mut self, approver: impl Into<String>) -> Self {
        self.approver = approver.into();
        self
    }

    pub fn with_exception_duration(mut self, secs: u64) -> Self {
        self.exception_duration_secs = Some(secs);
        self
    }
}

/// Owns review requests and the exceptions they produce
pub struct ApprovalWorkflow {
    requests: DashMap<String, ParentalReviewRequest>,
    /// (user, content) -> id of the pending request for it
    pending: DashMap<(String, String), String>,
    exceptions: Arc<ExceptionStore>,
    audit: Arc<AuditLog>,
    events: NotificationHub,
    settings: ApprovalSettings,
}

impl ApprovalWorkflow {
    pub fn new(settings: ApprovalSettings, exceptions: Arc<ExceptionStore>, audit: Arc<AuditLog>) -> Self {
        Self {
            requests: DashMap::new(),
            pending: DashMap::new(),
            exceptions,
            audit,
            events: NotificationHub::new(),
            settings,
        }
    }

    pub fn with_events(mut self, events: NotificationHub) -> Self {
        self.events = events;
        self
    }

    pub fn settings(&self) -> &ApprovalSettings {
        &self.settings
    }

    pub fn exceptions(&self) -> &Arc<ExceptionStore> {
        &self.exceptions
    }

    /// Open a review request, or return the pending one for the same content
    pub fn request_review(
        &self,
        user_id: &str,
        age_group: AgeGroup,
        content: &str,
        violations: Vec<Violation>,
        risk_level: RiskLevel,
    ) -> ParentalReviewRequest {
        let key = (user_id.to_string(), content.to_string());

        let request = match self.pending.entry(key) {
            Entry::Occupied(mut slot) => {
                let existing = self
                    .requests
                    .get(slot.get())
                    .filter(|r| r.status == ReviewStatus::Pending)
                    .map(|r| r.value().clone());
                if let Some(existing) = existing {
                    debug!(request_id = %existing.id, user_id, "reusing pending review request");
                    return existing;
                }
                let request = self.new_request(user_id, age_group, content, violations, risk_level);
                self.requests.insert(request.id.clone(), request.clone());
                slot.insert(request.id.clone());
                request
            }
            Entry::Vacant(slot) => {
                let request = self.new_request(user_id, age_group, content, violations, risk_level);
                self.requests.insert(request.id.clone(), request.clone());
                slot.insert(request.id.clone());
                request
            }
        };

        self.audit.log(
            SafetyAuditEntry::new(user_id, AuditEventType::ParentalReviewRequested, content)
                .with_risk(risk_level)
                .with_reasons(request.violations.iter().map(|v| v.description.clone()).collect())
                .with_review(Some(request.id.clone())),
        );

        info!(
            request_id = %request.id,
            user_id,
            priority = %request.priority,
            "parental review requested"
        );
        self.events.emit(SafetyEvent::ReviewRequested {
            request_id: request.id.clone(),
            user_id: request.user_id.clone(),
            priority: request.priority,
            excerpt: request.excerpt(EXCERPT_CHARS),
        });
        request
    }

    fn new_request(
        &self,
        user_id: &str,
        age_group: AgeGroup,
        content: &str,
        violations: Vec<Violation>,
        risk_level: RiskLevel,
    ) -> ParentalReviewRequest {
        let now = Utc::now();
        ParentalReviewRequest {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            age_group,
            content: content.to_string(),
            violations,
            risk_level,
            requested_at: now,
            expires_at: now + self.settings.timeout(),
            priority: ReviewPriority::from_risk(risk_level),
            status: ReviewStatus::Pending,
            parent_response: None,
            resolved_at: None,
        }
    }

    /// Approve or reject with the default approver
    pub fn process_decision(
        &self,
        request_id: &str,
        approved: bool,
        reason: &str,
    ) -> GuardResult<ParentalReviewRequest> {
        let input = if approved {
            DecisionInput::approve(reason)
        } else {
            DecisionInput::reject(reason)
        };
        self.process_decision_with(request_id, input)
    }

    /// Apply a parent's decision to a pending request
    ///
    /// Unknown ids and non-pending requests are errors and leave the audit
    /// log untouched. A pending request past its deadline that the sweep has
    /// not reached yet can still be decided.
    pub fn process_decision_with(
        &self,
        request_id: &str,
        input: DecisionInput,
    ) -> GuardResult<ParentalReviewRequest> {
        let (status, decision) = if input.approved {
            (ReviewStatus::Approved, ReviewDecision::Approved)
        } else {
            (ReviewStatus::Rejected, ReviewDecision::Rejected)
        };
        let now = Utc::now();

        let request = {
            let mut request = self
                .requests
                .get_mut(request_id)
                .ok_or_else(|| GuardError::RequestNotFound(request_id.to_string()))?;
            if !request.status.can_transition_to(status) {
                return Err(GuardError::RequestNotPending {
                    id: request_id.to_string(),
                    status: request.status,
                });
            }
            request.status = status;
            request.resolved_at = Some(now);
            request.parent_response = Some(ParentResponse {
                decision,
                reason: input.reason.clone(),
                approver: input.approver.clone(),
                exception_duration_secs: input.exception_duration_secs,
                responded_at: now,
            });
            request.clone()
        };

        let duration = input
            .exception_duration_secs
            .map(|secs| Duration::seconds(secs as i64))
            .unwrap_or_else(|| self.settings.exception_duration());
        self.finish(&request, decision, &input.reason, &input.approver, duration);
        Ok(request)
    }

    /// Expire overdue pending requests and apply the expiry policy
    ///
    /// Returns the requests that expired in this pass.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<ParentalReviewRequest> {
        let overdue: Vec<String> = self
            .requests
            .iter()
            .filter(|r| r.is_overdue_at(now))
            .map(|r| r.key().clone())
            .collect();

        let decision = match self.settings.expiry_policy {
            ExpiryPolicy::AutoReject => ReviewDecision::AutoRejected,
            ExpiryPolicy::AutoApprove => ReviewDecision::AutoApproved,
        };
        let reason = "no parental response before the deadline";

        let mut expired = Vec::new();
        for id in overdue {
            let request = {
                let Some(mut request) = self.requests.get_mut(&id) else {
                    continue;
                };
                // Decided between the scan and now
                if !request.is_overdue_at(now) {
                    continue;
                }
                request.status = ReviewStatus::Expired;
                request.resolved_at = Some(now);
                request.parent_response = Some(ParentResponse {
                    decision,
                    reason: reason.to_string(),
                    approver: SYSTEM_APPROVER.to_string(),
                    exception_duration_secs: None,
                    responded_at: now,
                });
                request.clone()
            };

            self.finish(
                &request,
                decision,
                reason,
                SYSTEM_APPROVER,
                self.settings.exception_duration(),
            );
            expired.push(request);
        }

        if !expired.is_empty() {
            info!(count = expired.len(), policy = ?self.settings.expiry_policy, "review requests expired");
        }
        expired
    }

    /// Shared tail of every transition: exception, index, audit, event
    fn finish(
        &self,
        request: &ParentalReviewRequest,
        decision: ReviewDecision,
        reason: &str,
        approver: &str,
        duration: Duration,
    ) {
        self.pending.remove_if(
            &(request.user_id.clone(), request.content.clone()),
            |_, id| id == &request.id,
        );

        let exception_id = if decision.is_approval() {
            let grant = ExceptionGrant::new(&request.user_id, &request.content, request.age_group)
                .with_reason(reason)
                .with_approver(approver)
                .with_duration(Some(duration))
                .with_max_usage(self.settings.exception_max_usage)
                .from_request(&request.id);
            match self.exceptions.grant(grant) {
                Ok(exception) => Some(exception.id),
                Err(e) => {
                    warn!(request_id = %request.id, error = %e, "could not grant exception");
                    None
                }
            }
        } else {
            None
        };

        let event_type = if request.status == ReviewStatus::Expired {
            AuditEventType::ReviewExpired
        } else {
            AuditEventType::ParentalDecision
        };
        let mut entry = SafetyAuditEntry::new(&request.user_id, event_type, &request.content)
            .with_processed(format!("{}: {}", decision, reason))
            .with_risk(request.risk_level)
            .with_review(Some(request.id.clone()));
        if let Some(ref id) = exception_id {
            entry = entry.with_exception(id);
        }
        self.audit.log(entry);

        info!(
            request_id = %request.id,
            user_id = %request.user_id,
            decision = %decision,
            "review request resolved"
        );

        let excerpt = excerpt(&request.content, EXCERPT_CHARS);
        let event = if request.status == ReviewStatus::Expired {
            SafetyEvent::ReviewExpired {
                request_id: request.id.clone(),
                user_id: request.user_id.clone(),
                priority: request.priority,
                decision,
                excerpt,
            }
        } else {
            SafetyEvent::ReviewDecided {
                request_id: request.id.clone(),
                user_id: request.user_id.clone(),
                priority: request.priority,
                decision,
                excerpt,
            }
        };
        self.events.emit(event);
    }

    pub fn get(&self, request_id: &str) -> Option<ParentalReviewRequest> {
        self.requests.get(request_id).map(|r| r.value().clone())
    }

    /// Requests filtered by status and user, oldest first
    pub fn list(&self, status: Option<ReviewStatus>, user_id: Option<&str>) -> Vec<ParentalReviewRequest> {
        let mut requests: Vec<ParentalReviewRequest> = self
            .requests
            .iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .filter(|r| user_id.map_or(true, |u| r.user_id == u))
            .map(|r| r.value().clone())
            .collect();
        requests.sort_by_key(|r| r.requested_at);
        requests
    }

    pub fn pending_count(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| r.status == ReviewStatus::Pending)
            .count()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl std::fmt::Debug for ApprovalWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalWorkflow")
            .field("requests", &self.requests.len())
            .field("pending", &self.pending.len())
            .field("expiry_policy", &self.settings.expiry_policy)
            .finish()
    }
}
