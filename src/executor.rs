//! Two-phase permission execution.
//!
//! [`PermissionExecutor`] belongs to a single request. Create and update
//! requests evaluate their operation tree first. An undecided (deferred)
//! result parks the matching commit tree in a FIFO queue, and
//! [`PermissionExecutor::check_commit_permissions`] decides it once every
//! mutation of the unit of work is staged. Read and delete requests have no
//! commit point and are decided on the spot.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::builder::ExpressionBuilder;
use crate::cache::PermissionCache;
use crate::check::{CheckFactory, CheckId};
use crate::config::PermissionConfig;
use crate::dictionary::EntityDictionary;
use crate::error::{ForbiddenAccess, PermissionError};
use crate::expression::Expression;
use crate::result::ExpressionResult;
use crate::stats::EvaluationStats;
use crate::types::{ChangeSpec, PermissionKind, PersistentResource, RequestScope};

/// A commit tree waiting for the end of the unit of work.
#[derive(Debug)]
struct QueuedCommit<T> {
    expression: Expression<T>,
    resource_type: String,
    id: Option<String>,
    kind: PermissionKind,
}

/// Bounded FIFO of commit-phase expressions.
#[derive(Debug)]
pub struct CommitCheckQueue<T> {
    entries: VecDeque<QueuedCommit<T>>,
    max: usize,
}

impl<T> CommitCheckQueue<T> {
    /// Create an empty queue holding at most `max` entries.
    pub fn new(max: usize) -> Self {
        CommitCheckQueue {
            entries: VecDeque::new(),
            max,
        }
    }

    fn push(&mut self, entry: QueuedCommit<T>) -> Result<(), PermissionError> {
        if self.entries.len() >= self.max {
            tracing::warn!(max = self.max, "commit check queue full");
            return Err(PermissionError::CommitQueueFull { max: self.max });
        }
        self.entries.push_back(entry);
        Ok(())
    }

    fn take(&mut self) -> VecDeque<QueuedCommit<T>> {
        std::mem::take(&mut self.entries)
    }

    /// Number of queued expressions.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discard every queued expression.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Per-request permission orchestrator.
///
/// Owns the permission cache and the commit check queue. Neither is ever
/// shared with another request.
pub struct PermissionExecutor<'a, T> {
    builder: ExpressionBuilder<'a, T>,
    cache: PermissionCache,
    queue: CommitCheckQueue<T>,
    scope: Rc<RequestScope>,
    stats: EvaluationStats,
}

impl<'a, T> PermissionExecutor<'a, T> {
    /// Create an executor for one request with default limits.
    pub fn new(
        dictionary: &'a dyn EntityDictionary,
        factory: &'a dyn CheckFactory<T>,
        scope: Rc<RequestScope>,
    ) -> Self {
        PermissionExecutor::with_config(dictionary, factory, scope, PermissionConfig::default())
    }

    /// Create an executor for one request with explicit limits.
    pub fn with_config(
        dictionary: &'a dyn EntityDictionary,
        factory: &'a dyn CheckFactory<T>,
        scope: Rc<RequestScope>,
        config: PermissionConfig,
    ) -> Self {
        PermissionExecutor {
            builder: ExpressionBuilder::with_config(dictionary, factory, config),
            cache: PermissionCache::new(),
            queue: CommitCheckQueue::new(config.max_commit_queue),
            scope,
            stats: EvaluationStats::new(),
        }
    }

    /// Authorize `kind` on `resource`, optionally narrowed to one `field`.
    ///
    /// Returns `Ok` when access is granted or, for create and update, when
    /// the decision was deferred to [`check_commit_permissions`].
    ///
    /// [`check_commit_permissions`]: PermissionExecutor::check_commit_permissions
    pub fn check_permission(
        &mut self,
        resource: &PersistentResource<T>,
        kind: PermissionKind,
        change: Option<ChangeSpec>,
        field: Option<&str>,
    ) -> Result<(), PermissionError> {
        if self.scope.is_security_bypassed() {
            return Ok(());
        }

        let (operation, commit) = self
            .builder
            .build(resource, kind, field, change)?
            .into_parts();
        if commit.is_noop() {
            tracing::trace!(
                resource_type = resource.resource_type(),
                %kind,
                field,
                "no checks declared"
            );
            return Ok(());
        }

        if kind.is_mutation() {
            let evaluation = operation.evaluate(&mut self.cache)?;
            self.stats.merge(&evaluation.stats);
            match evaluation.result {
                ExpressionResult::Pass => Ok(()),
                ExpressionResult::Fail => Err(self.deny(
                    resource.resource_type(),
                    resource.id(),
                    kind,
                    evaluation.failed_check,
                )),
                ExpressionResult::Deferred => {
                    tracing::debug!(
                        resource_type = resource.resource_type(),
                        id = resource.id(),
                        %kind,
                        field,
                        "deferring permission to commit"
                    );
                    self.queue.push(QueuedCommit {
                        expression: commit,
                        resource_type: resource.resource_type().to_owned(),
                        id: resource.id().map(str::to_owned),
                        kind,
                    })
                }
            }
        } else {
            let evaluation = commit.evaluate(&mut self.cache)?;
            self.stats.merge(&evaluation.stats);
            match evaluation.result {
                ExpressionResult::Pass => Ok(()),
                ExpressionResult::Fail => Err(self.deny(
                    resource.resource_type(),
                    resource.id(),
                    kind,
                    evaluation.failed_check,
                )),
                ExpressionResult::Deferred => Err(PermissionError::UnresolvedDeferral),
            }
        }
    }

    /// Decide every deferred authorization point, in the order it was queued.
    ///
    /// Stops at the first denial. The queue is empty afterwards either way.
    pub fn check_commit_permissions(&mut self) -> Result<(), PermissionError> {
        let queued = self.queue.take();
        if self.scope.is_security_bypassed() {
            return Ok(());
        }

        tracing::debug!(pending = queued.len(), "running commit checks");
        for entry in queued {
            if entry.expression.is_noop() {
                continue;
            }
            let evaluation = entry.expression.evaluate(&mut self.cache)?;
            self.stats.merge(&evaluation.stats);
            match evaluation.result {
                ExpressionResult::Pass => {}
                ExpressionResult::Fail => {
                    return Err(self.deny(
                        &entry.resource_type,
                        entry.id.as_deref(),
                        entry.kind,
                        evaluation.failed_check,
                    ))
                }
                ExpressionResult::Deferred => return Err(PermissionError::UnresolvedDeferral),
            }
        }
        Ok(())
    }

    /// Number of commit trees waiting for [`check_commit_permissions`].
    ///
    /// [`check_commit_permissions`]: PermissionExecutor::check_commit_permissions
    #[inline]
    pub fn pending_commit_checks(&self) -> usize {
        self.queue.len()
    }

    /// Statistics accumulated over every evaluation of this request.
    #[inline]
    pub fn stats(&self) -> &EvaluationStats {
        &self.stats
    }

    /// Number of check results cached for this request.
    #[inline]
    pub fn cached_results(&self) -> usize {
        self.cache.len()
    }

    /// Discard queued commit trees, cached results and statistics.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.cache.clear();
        self.stats = EvaluationStats::new();
    }

    fn deny(
        &self,
        resource_type: &str,
        id: Option<&str>,
        kind: PermissionKind,
        check: Option<CheckId>,
    ) -> PermissionError {
        tracing::debug!(
            resource_type,
            id,
            %kind,
            check = check.as_ref().map(CheckId::as_str),
            "forbidden"
        );
        ForbiddenAccess {
            resource_type: resource_type.to_owned(),
            id: id.map(str::to_owned),
            kind,
            check,
        }
        .into()
    }
}
