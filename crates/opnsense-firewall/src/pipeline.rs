//! Staged rule changes: mutate, savepoint, then apply or cancel.
//!
//! A mutation lands in the appliance's candidate configuration first. It only
//! becomes live once a savepoint revision is applied, and callers are told
//! which of the two happened: an outcome with `applied == false` means the
//! rule exists but is not enforcing anything yet.
//!
//! Pipelines do not coordinate with each other unless they share a commit
//! lock. Without one, two callers that both take a savepoint before either
//! applies can end up activating each other's pending edits.

use crate::client::{ChangeRevision, FilterClient};
use crate::models::{RuleSpec, RuleUpdate};
use crate::Result;
use opnsense_core::uuid::RuleUuid;
use opnsense_core::Error;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

const NOT_STAGED_NOTE: &str =
    "Rule changed in the candidate configuration without a savepoint; the change is not live";
const NOT_LIVE_NOTE: &str =
    "Rule changed in the candidate configuration but the change is not live";

/// Lock shared by pipelines that must not interleave savepoint and apply.
pub type CommitLock = Arc<Mutex<()>>;

/// Lifecycle position of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Mutated in the candidate configuration only
    Draft,
    /// Savepoint taken, not yet applied
    Staged,
    /// Live on the appliance
    Applied,
    /// Revision abandoned without applying
    RolledBack,
}

/// Caller-facing result class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Everything requested happened
    Success,
    /// The rule was mutated but the change is not live
    PartialSuccess,
    /// Nothing was changed
    Error,
}

/// Operation an outcome reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperation {
    /// Rule creation
    Create,
    /// Rule update
    Update,
    /// Rule deletion
    Delete,
    /// Enable or disable
    Toggle,
    /// Activation of a staged revision
    Apply,
    /// Abandonment of a staged revision
    Cancel,
}

/// Structured result of a pipeline operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeOutcome {
    /// What was attempted
    pub operation: RuleOperation,
    /// Result class
    pub status: OutcomeStatus,
    /// Where the change ended up
    pub state: PipelineState,
    /// Rule the change touched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_uuid: Option<RuleUuid>,
    /// Whether the change is live
    pub applied: bool,
    /// Savepoint revision, when one was taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Human-readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable failure class, e.g. `HTTP_FAILURE`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

impl ChangeOutcome {
    fn new(operation: RuleOperation, status: OutcomeStatus, state: PipelineState) -> Self {
        Self {
            operation,
            status,
            state,
            rule_uuid: None,
            applied: false,
            revision: None,
            note: None,
            error: None,
            error_code: None,
        }
    }

    /// Outcome for an operation that failed before changing anything.
    #[must_use]
    pub fn failed(operation: RuleOperation, error: &Error) -> Self {
        Self::new(operation, OutcomeStatus::Error, PipelineState::Draft).with_error(error)
    }

    fn with_rule(mut self, uuid: Option<RuleUuid>) -> Self {
        self.rule_uuid = uuid;
        self
    }

    fn with_revision(mut self, revision: Option<String>) -> Self {
        self.revision = revision;
        self
    }

    fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    fn with_error(mut self, error: &Error) -> Self {
        self.error = Some(error.to_string());
        self.error_code = Some(error.error_code());
        self
    }

    /// True for `success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Result of a mutation: the outcome plus the staged revision when the
/// caller asked not to apply.
#[derive(Debug)]
pub struct RuleChange {
    /// Structured outcome
    pub outcome: ChangeOutcome,
    /// Pending revision to apply or cancel
    pub staged: Option<StagedChange>,
}

/// Whether a rule exists and whether it is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleStatus {
    /// Rule UUID
    pub uuid: RuleUuid,
    /// Present in the candidate configuration
    pub exists: bool,
    /// Mutated through this pipeline and not yet applied
    pub pending: bool,
    /// Present and not pending
    pub applied: bool,
}

struct PipelineInner {
    filter: FilterClient,
    pending: Mutex<BTreeSet<RuleUuid>>,
    consumed: Mutex<HashSet<String>>,
    commit_lock: Option<CommitLock>,
}

impl PipelineInner {
    /// Claim `token` for a single apply or cancel. False when it was already
    /// applied or cancelled, or is in flight.
    async fn claim(&self, token: &str) -> bool {
        self.consumed.lock().await.insert(token.to_string())
    }

    /// Return a claimed token after a failed apply or cancel; the revision is
    /// still staged on the appliance.
    async fn release(&self, token: &str) {
        self.consumed.lock().await.remove(token);
    }
}

/// Rule mutations with savepoint/apply/rollback handling.
///
/// Cheap to clone; clones share pending-change tracking.
#[derive(Clone)]
pub struct RuleChangePipeline {
    inner: Arc<PipelineInner>,
}

impl RuleChangePipeline {
    /// Pipeline without cross-pipeline serialization.
    #[must_use]
    pub fn new(filter: FilterClient) -> Self {
        Self::build(filter, None)
    }

    /// Pipeline that holds `lock` from the first mutation until its revision is
    /// applied or cancelled.
    ///
    /// A caller holding a [`StagedChange`] from a locked pipeline must consume
    /// it before starting another change on a pipeline sharing the same lock.
    #[must_use]
    pub fn with_commit_lock(filter: FilterClient, lock: CommitLock) -> Self {
        Self::build(filter, Some(lock))
    }

    fn build(filter: FilterClient, commit_lock: Option<CommitLock>) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                filter,
                pending: Mutex::new(BTreeSet::new()),
                consumed: Mutex::new(HashSet::new()),
                commit_lock,
            }),
        }
    }

    /// Access the filter client.
    #[must_use]
    pub fn filter(&self) -> &FilterClient {
        &self.inner.filter
    }

    /// Create a rule, then stage it or apply it.
    ///
    /// # Errors
    ///
    /// Returns the creation failure; nothing is staged in that case.
    pub async fn create_rule(&self, spec: &RuleSpec, apply: bool) -> Result<RuleChange> {
        let guard = self.lock().await;
        let uuid = self.inner.filter.add_rule(spec).await?;
        self.mark_pending(uuid).await;
        Ok(self.commit(RuleOperation::Create, Some(uuid), apply, guard).await)
    }

    /// Update a rule, then stage it or apply it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown UUID and any update failure.
    pub async fn update_rule(
        &self,
        uuid: RuleUuid,
        update: &RuleUpdate,
        apply: bool,
    ) -> Result<RuleChange> {
        let guard = self.lock().await;
        self.inner.filter.get_rule(uuid).await?;
        self.inner.filter.set_rule(uuid, update).await?;
        self.mark_pending(uuid).await;
        Ok(self.commit(RuleOperation::Update, Some(uuid), apply, guard).await)
    }

    /// Delete a rule, then stage it or apply it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown UUID and any delete failure.
    pub async fn delete_rule(&self, uuid: RuleUuid, apply: bool) -> Result<RuleChange> {
        let guard = self.lock().await;
        self.inner.filter.get_rule(uuid).await?;
        self.inner.filter.del_rule(uuid).await?;
        self.mark_pending(uuid).await;
        Ok(self.commit(RuleOperation::Delete, Some(uuid), apply, guard).await)
    }

    /// Enable or disable a rule, then stage it or apply it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown UUID and any toggle failure.
    pub async fn toggle_rule(
        &self,
        uuid: RuleUuid,
        enabled: bool,
        apply: bool,
    ) -> Result<RuleChange> {
        let guard = self.lock().await;
        self.inner.filter.get_rule(uuid).await?;
        self.inner.filter.toggle_rule(uuid, enabled).await?;
        self.mark_pending(uuid).await;
        Ok(self.commit(RuleOperation::Toggle, Some(uuid), apply, guard).await)
    }

    /// Take a savepoint over whatever is pending in the candidate
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns the savepoint failure.
    pub async fn stage(&self) -> Result<StagedChange> {
        let guard = self.lock().await;
        let revision = self.inner.filter.savepoint().await?;
        Ok(self.staged(RuleOperation::Apply, None, revision, guard))
    }

    /// Rebuild a staged change from a revision issued earlier, e.g. one a
    /// caller kept from a previous outcome.
    ///
    /// A revision this pipeline (or a clone of it) already applied or
    /// cancelled is refused when the rebuilt change is applied or cancelled.
    #[must_use]
    pub fn resume(&self, revision: ChangeRevision) -> StagedChange {
        self.staged(RuleOperation::Apply, None, revision, None)
    }

    /// Report whether `uuid` exists and whether this pipeline still has it
    /// pending.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures other than [`Error::NotFound`].
    pub async fn rule_status(&self, uuid: RuleUuid) -> Result<RuleStatus> {
        let exists = match self.inner.filter.get_rule(uuid).await {
            Ok(_) => true,
            Err(Error::NotFound(_)) => false,
            Err(err) => return Err(err),
        };
        let pending = self.inner.pending.lock().await.contains(&uuid);
        Ok(RuleStatus {
            uuid,
            exists,
            pending,
            applied: exists && !pending,
        })
    }

    async fn lock(&self) -> Option<OwnedMutexGuard<()>> {
        match &self.inner.commit_lock {
            Some(lock) => Some(Arc::clone(lock).lock_owned().await),
            None => None,
        }
    }

    async fn mark_pending(&self, uuid: RuleUuid) {
        self.inner.pending.lock().await.insert(uuid);
    }

    fn staged(
        &self,
        operation: RuleOperation,
        rule_uuid: Option<RuleUuid>,
        revision: ChangeRevision,
        guard: Option<OwnedMutexGuard<()>>,
    ) -> StagedChange {
        StagedChange {
            inner: Arc::clone(&self.inner),
            operation,
            rule_uuid,
            revision: Some(revision),
            guard,
        }
    }

    async fn commit(
        &self,
        operation: RuleOperation,
        rule_uuid: Option<RuleUuid>,
        apply: bool,
        guard: Option<OwnedMutexGuard<()>>,
    ) -> RuleChange {
        let revision = match self.inner.filter.savepoint().await {
            Ok(revision) => revision,
            Err(err) => {
                warn!(?operation, error = %err, "Savepoint failed after mutation");
                let outcome = ChangeOutcome::new(
                    operation,
                    OutcomeStatus::PartialSuccess,
                    PipelineState::Draft,
                )
                .with_rule(rule_uuid)
                .with_note(NOT_STAGED_NOTE)
                .with_error(&err);
                return RuleChange {
                    outcome,
                    staged: None,
                };
            }
        };

        let staged = self.staged(operation, rule_uuid, revision, guard);
        if apply {
            let outcome = staged.finish_apply(operation).await;
            return RuleChange {
                outcome,
                staged: None,
            };
        }

        let outcome = ChangeOutcome::new(operation, OutcomeStatus::Success, PipelineState::Staged)
            .with_rule(rule_uuid)
            .with_revision(staged.revision().map(str::to_string))
            .with_note("Change staged; apply the revision to make it live");
        info!(?operation, revision = ?outcome.revision, "Change staged");
        RuleChange {
            outcome,
            staged: Some(staged),
        }
    }
}

/// A savepoint revision waiting to be applied or cancelled.
///
/// Consumed by [`apply`](Self::apply) or [`cancel`](Self::cancel). Dropping it
/// unconsumed leaves the change pending on the appliance.
#[must_use = "a staged change must be applied or cancelled"]
pub struct StagedChange {
    inner: Arc<PipelineInner>,
    operation: RuleOperation,
    rule_uuid: Option<RuleUuid>,
    revision: Option<ChangeRevision>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl StagedChange {
    /// Revision identifier.
    #[must_use]
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_ref().map(ChangeRevision::as_str)
    }

    /// Rule the change touched, when it came from a single mutation.
    #[must_use]
    pub const fn rule_uuid(&self) -> Option<RuleUuid> {
        self.rule_uuid
    }

    /// Activate the revision.
    ///
    /// A failed apply yields `partial_success`: the mutation is still in the
    /// candidate configuration.
    pub async fn apply(self) -> ChangeOutcome {
        self.finish_apply(RuleOperation::Apply).await
    }

    async fn finish_apply(mut self, operation: RuleOperation) -> ChangeOutcome {
        let Some(revision) = self.revision.take() else {
            return ChangeOutcome::failed(
                operation,
                &Error::InvalidRequest("revision already consumed".to_string()),
            );
        };
        let token = revision.as_str().to_string();
        if !self.inner.claim(&token).await {
            return reused(operation, &token).with_rule(self.rule_uuid);
        }
        let base = |status, state| {
            ChangeOutcome::new(operation, status, state)
                .with_rule(self.rule_uuid)
                .with_revision(Some(token.clone()))
        };

        match self.inner.filter.apply(revision).await {
            Ok(()) => {
                self.inner.pending.lock().await.clear();
                let mut outcome = base(OutcomeStatus::Success, PipelineState::Applied);
                outcome.applied = true;
                outcome
            }
            Err(err) => {
                warn!(revision = %token, error = %err, "Apply failed; change remains staged");
                self.inner.release(&token).await;
                base(OutcomeStatus::PartialSuccess, PipelineState::Staged)
                    .with_note(NOT_LIVE_NOTE)
                    .with_error(&err)
            }
        }
    }

    /// Abandon the revision without applying it.
    ///
    /// Pending edits stay in the candidate configuration; a later apply
    /// activates them.
    pub async fn cancel(mut self) -> ChangeOutcome {
        let Some(revision) = self.revision.take() else {
            return ChangeOutcome::failed(
                RuleOperation::Cancel,
                &Error::InvalidRequest("revision already consumed".to_string()),
            );
        };
        let token = revision.as_str().to_string();
        if !self.inner.claim(&token).await {
            return reused(RuleOperation::Cancel, &token).with_rule(self.rule_uuid);
        }

        match self.inner.filter.cancel_rollback(revision).await {
            Ok(()) => ChangeOutcome::new(
                RuleOperation::Cancel,
                OutcomeStatus::Success,
                PipelineState::RolledBack,
            )
            .with_rule(self.rule_uuid)
            .with_revision(Some(token)),
            Err(err) => {
                warn!(revision = %token, error = %err, "Cancel failed; change remains staged");
                self.inner.release(&token).await;
                ChangeOutcome::new(
                    RuleOperation::Cancel,
                    OutcomeStatus::Error,
                    PipelineState::Staged,
                )
                .with_rule(self.rule_uuid)
                .with_revision(Some(token))
                .with_error(&err)
            }
        }
    }
}

fn reused(operation: RuleOperation, token: &str) -> ChangeOutcome {
    warn!(revision = %token, ?operation, "Refusing revision that was already used");
    ChangeOutcome::failed(
        operation,
        &Error::InvalidRequest(format!("revision `{token}` was already applied or cancelled")),
    )
    .with_revision(Some(token.to_string()))
}

impl fmt::Debug for StagedChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedChange")
            .field("operation", &self.operation)
            .field("rule_uuid", &self.rule_uuid)
            .field("revision", &self.revision)
            .field("locked", &self.guard.is_some())
            .finish()
    }
}

impl Drop for StagedChange {
    fn drop(&mut self) {
        if let Some(revision) = &self.revision {
            warn!(%revision, "Staged change dropped without apply or cancel");
        }
    }
}
