//! Permission expression trees.
//!
//! Leaves wrap one [`CheckInvocation`]; inner nodes combine results with the
//! tri-state algebra of [`ExpressionResult`]. Evaluation is stack-based
//! (non-recursive) and strictly left to right. A right operand that cannot
//! change the outcome is never visited, so its checks are never invoked.

use std::fmt;
use std::rc::Rc;

use crate::cache::PermissionCache;
use crate::check::{CheckId, CheckInstance};
use crate::error::PermissionError;
use crate::result::ExpressionResult;
use crate::stats::EvaluationStats;
use crate::types::{ChangeSpec, PersistentResource};

/// One check bound to the resource and change it is evaluated against.
pub struct CheckInvocation<T> {
    check: CheckInstance<T>,
    resource: PersistentResource<T>,
    change: Option<Rc<ChangeSpec>>,
}

impl<T> CheckInvocation<T> {
    /// Bind a check to a resource and optional change.
    pub fn new(
        check: CheckInstance<T>,
        resource: PersistentResource<T>,
        change: Option<Rc<ChangeSpec>>,
    ) -> Self {
        CheckInvocation {
            check,
            resource,
            change,
        }
    }

    /// The bound check.
    #[inline]
    pub fn check(&self) -> &CheckInstance<T> {
        &self.check
    }

    /// Run the check against the resource's current object state.
    fn invoke(&self) -> Result<ExpressionResult, PermissionError> {
        let object = self.resource.object()?;
        let ok = self
            .check
            .ok(&object, self.resource.scope(), self.change.as_deref());
        tracing::trace!(
            check = %self.check.id(),
            resource_type = self.resource.resource_type(),
            id = self.resource.id(),
            ok,
            "invoked check"
        );
        Ok(ExpressionResult::from_bool(ok))
    }

    #[inline]
    fn is_commit_only(&self) -> bool {
        self.check.kind().is_commit_only()
    }
}

impl<T> fmt::Debug for CheckInvocation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckInvocation")
            .field("check", &self.check.id())
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// A node of a permission expression tree.
pub enum Expression<T> {
    /// Always invokes the check (cached per instance).
    ImmediateCheck(CheckInvocation<T>),
    /// `Deferred` for commit-only checks, otherwise as `ImmediateCheck`.
    DeferredCheck(CheckInvocation<T>),
    /// `Deferred` for commit-only checks, otherwise invokes the check
    /// directly without consulting or filling the cache.
    CommitOnlyCheck(CheckInvocation<T>),
    /// Tri-state AND, short-circuiting on `Fail`.
    And(Box<Expression<T>>, Box<Expression<T>>),
    /// Tri-state OR, short-circuiting on `Pass`.
    Or(Box<Expression<T>>, Box<Expression<T>>),
    /// Field result unless it fails, then the entity result.
    /// A `Noop` entity counts as `Pass`.
    AnyField {
        /// Shared entity-level rule.
        entity: Box<Expression<T>>,
        /// Field-level rule, evaluated first.
        field: Box<Expression<T>>,
    },
    /// The field rule when one exists, otherwise the entity rule.
    SpecificField {
        /// Entity-level fallback.
        entity: Box<Expression<T>>,
        /// Field-level rule; `None` when nothing is declared for the field.
        field: Option<Box<Expression<T>>>,
    },
    /// No checks declared for this slot. Evaluates to `Fail` as a leaf.
    Noop,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Final tri-state result.
    pub result: ExpressionResult,
    /// Last check that produced `Fail`, if any.
    pub failed_check: Option<CheckId>,
    /// Work done while evaluating.
    pub stats: EvaluationStats,
}

impl<T> Expression<T> {
    /// Leaf that always invokes `invocation`.
    pub fn immediate(invocation: CheckInvocation<T>) -> Self {
        Expression::ImmediateCheck(invocation)
    }

    /// Leaf that defers commit-only checks.
    pub fn deferred(invocation: CheckInvocation<T>) -> Self {
        Expression::DeferredCheck(invocation)
    }

    /// Uncached leaf that defers commit-only checks.
    pub fn commit_only(invocation: CheckInvocation<T>) -> Self {
        Expression::CommitOnlyCheck(invocation)
    }

    /// `left AND right`.
    pub fn and(left: Expression<T>, right: Expression<T>) -> Self {
        Expression::And(Box::new(left), Box::new(right))
    }

    /// `left OR right`.
    pub fn or(left: Expression<T>, right: Expression<T>) -> Self {
        Expression::Or(Box::new(left), Box::new(right))
    }

    /// Join an entity rule and a field rule for an any-field query.
    pub fn any_field(entity: Expression<T>, field: Expression<T>) -> Self {
        Expression::AnyField {
            entity: Box::new(entity),
            field: Box::new(field),
        }
    }

    /// Join an entity rule and a field rule for a named field.
    ///
    /// A `Noop` field rule is dropped here, so the entity rule applies.
    pub fn specific_field(entity: Expression<T>, field: Expression<T>) -> Self {
        let field = if field.is_noop() {
            None
        } else {
            Some(Box::new(field))
        };
        Expression::SpecificField {
            entity: Box::new(entity),
            field,
        }
    }

    /// Returns `true` if evaluating this expression can only ever mean
    /// "nothing was declared".
    pub fn is_noop(&self) -> bool {
        let mut node = self;
        loop {
            match node {
                Expression::Noop => return true,
                Expression::SpecificField { entity, field: None } => node = &**entity,
                _ => return false,
            }
        }
    }

    /// Compute the depth of this expression tree.
    ///
    /// Non-recursive, so it is safe on unvalidated deep trees.
    pub fn depth(&self) -> usize {
        let mut stack = Vec::with_capacity(32);
        stack.push((self, 1_usize));
        let mut max = 0;

        while let Some((node, depth)) = stack.pop() {
            max = max.max(depth);
            let next = depth.saturating_add(1);
            match node {
                Expression::ImmediateCheck(_)
                | Expression::DeferredCheck(_)
                | Expression::CommitOnlyCheck(_)
                | Expression::Noop => {}
                Expression::And(a, b) | Expression::Or(a, b) => {
                    stack.push((&**b, next));
                    stack.push((&**a, next));
                }
                Expression::AnyField { entity, field } => {
                    stack.push((&**entity, next));
                    stack.push((&**field, next));
                }
                Expression::SpecificField { entity, field } => {
                    stack.push((&**entity, next));
                    if let Some(field) = field {
                        stack.push((&**field, next));
                    }
                }
            }
        }

        max
    }

    /// Identifiers of every check leaf, left to right.
    pub fn check_ids(&self) -> Vec<CheckId> {
        let mut ids = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Expression::ImmediateCheck(inv)
                | Expression::DeferredCheck(inv)
                | Expression::CommitOnlyCheck(inv) => ids.push(inv.check().id().clone()),
                Expression::Noop => {}
                Expression::And(a, b) | Expression::Or(a, b) => {
                    stack.push(&**b);
                    stack.push(&**a);
                }
                Expression::AnyField { entity, field } => {
                    stack.push(&**entity);
                    stack.push(&**field);
                }
                Expression::SpecificField { entity, field } => {
                    stack.push(&**entity);
                    if let Some(field) = field {
                        stack.push(&**field);
                    }
                }
            }
        }
        ids
    }

    /// Evaluate this expression, reading and filling `cache`.
    ///
    /// Errors only when a check cannot be given its object (see
    /// [`PermissionError::ObjectBorrowed`]) or on an internal invariant
    /// violation; denial is reported through the result, not as an error.
    pub fn evaluate(&self, cache: &mut PermissionCache) -> Result<Evaluation, PermissionError> {
        enum Frame<'e, T> {
            Eval(&'e Expression<T>),
            AndRight(&'e Expression<T>),
            OrRight(&'e Expression<T>),
            ApplyAnd(ExpressionResult),
            ApplyOr(ExpressionResult),
            EntityFallback(&'e Expression<T>),
        }

        let mut stats = EvaluationStats::new();
        let mut failed_check = None;
        let mut stack: Vec<Frame<'_, T>> = Vec::with_capacity(32);
        stack.push(Frame::Eval(self));
        let mut results: Vec<ExpressionResult> = Vec::with_capacity(16);

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Eval(node) => {
                    stats.inc_nodes();
                    match node {
                        Expression::ImmediateCheck(inv) => {
                            results.push(eval_cached(inv, cache, &mut stats, &mut failed_check)?);
                        }
                        Expression::DeferredCheck(inv) => {
                            let result = if inv.is_commit_only() {
                                stats.inc_deferred();
                                ExpressionResult::Deferred
                            } else {
                                eval_cached(inv, cache, &mut stats, &mut failed_check)?
                            };
                            results.push(result);
                        }
                        Expression::CommitOnlyCheck(inv) => {
                            let result = if inv.is_commit_only() {
                                stats.inc_deferred();
                                ExpressionResult::Deferred
                            } else {
                                stats.inc_invoked();
                                record_failure(inv, inv.invoke()?, &mut failed_check)
                            };
                            results.push(result);
                        }
                        Expression::And(a, b) => {
                            stack.push(Frame::AndRight(&**b));
                            stack.push(Frame::Eval(&**a));
                        }
                        Expression::Or(a, b) => {
                            stack.push(Frame::OrRight(&**b));
                            stack.push(Frame::Eval(&**a));
                        }
                        Expression::AnyField { entity, field } => {
                            stack.push(Frame::EntityFallback(&**entity));
                            stack.push(Frame::Eval(&**field));
                        }
                        Expression::SpecificField { entity, field } => {
                            stack.push(Frame::Eval(field.as_deref().unwrap_or(&**entity)));
                        }
                        Expression::Noop => results.push(ExpressionResult::Fail),
                    }
                }
                Frame::AndRight(right) => {
                    let left = results.pop().ok_or(PermissionError::Internal)?;
                    if left.is_fail() {
                        stats.inc_short_circuits();
                        results.push(ExpressionResult::Fail);
                    } else {
                        stack.push(Frame::ApplyAnd(left));
                        stack.push(Frame::Eval(right));
                    }
                }
                Frame::OrRight(right) => {
                    let left = results.pop().ok_or(PermissionError::Internal)?;
                    if left.is_pass() {
                        stats.inc_short_circuits();
                        results.push(ExpressionResult::Pass);
                    } else {
                        stack.push(Frame::ApplyOr(left));
                        stack.push(Frame::Eval(right));
                    }
                }
                Frame::ApplyAnd(left) => {
                    let right = results.pop().ok_or(PermissionError::Internal)?;
                    results.push(left.and(right));
                }
                Frame::ApplyOr(left) => {
                    let right = results.pop().ok_or(PermissionError::Internal)?;
                    results.push(left.or(right));
                }
                Frame::EntityFallback(entity) => {
                    let field = results.pop().ok_or(PermissionError::Internal)?;
                    if !field.is_fail() {
                        stats.inc_short_circuits();
                        results.push(field);
                    } else if entity.is_noop() {
                        results.push(ExpressionResult::Pass);
                    } else {
                        stack.push(Frame::Eval(entity));
                    }
                }
            }
            stats.update_depth(stack.len());
        }

        let result = results.pop().ok_or(PermissionError::Internal)?;
        if !results.is_empty() {
            return Err(PermissionError::Internal);
        }
        Ok(Evaluation {
            result,
            failed_check,
            stats,
        })
    }
}

fn eval_cached<T>(
    inv: &CheckInvocation<T>,
    cache: &mut PermissionCache,
    stats: &mut EvaluationStats,
    failed_check: &mut Option<CheckId>,
) -> Result<ExpressionResult, PermissionError> {
    let instance = inv.check().instance();
    let result = match cache.get(instance) {
        Some(result) => {
            stats.inc_cache_hits();
            result
        }
        None => {
            stats.inc_invoked();
            cache.insert(instance, inv.invoke()?)
        }
    };
    Ok(record_failure(inv, result, failed_check))
}

#[inline]
fn record_failure<T>(
    inv: &CheckInvocation<T>,
    result: ExpressionResult,
    failed_check: &mut Option<CheckId>,
) -> ExpressionResult {
    if result.is_fail() {
        *failed_check = Some(inv.check().id().clone());
    }
    result
}

/// Iterative drop so long any-field OR chains cannot overflow the stack.
impl<T> Drop for Expression<T> {
    fn drop(&mut self) {
        fn take<T>(slot: &mut Box<Expression<T>>) -> Box<Expression<T>> {
            std::mem::replace(slot, Box::new(Expression::Noop))
        }

        fn detach<T>(node: &mut Expression<T>, stack: &mut Vec<Box<Expression<T>>>) {
            match node {
                Expression::And(a, b) | Expression::Or(a, b) => {
                    stack.push(take(a));
                    stack.push(take(b));
                }
                Expression::AnyField { entity, field } => {
                    stack.push(take(entity));
                    stack.push(take(field));
                }
                Expression::SpecificField { entity, field } => {
                    stack.push(take(entity));
                    if let Some(field) = field.take() {
                        stack.push(field);
                    }
                }
                _ => {}
            }
        }

        let mut stack = Vec::new();
        detach(self, &mut stack);
        while let Some(mut node) = stack.pop() {
            detach(&mut node, &mut stack);
        }
    }
}

impl<T> fmt::Debug for Expression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::ImmediateCheck(inv) => {
                f.debug_tuple("Immediate").field(inv.check().id()).finish()
            }
            Expression::DeferredCheck(inv) => {
                f.debug_tuple("Deferred").field(inv.check().id()).finish()
            }
            Expression::CommitOnlyCheck(inv) => {
                f.debug_tuple("CommitOnly").field(inv.check().id()).finish()
            }
            Expression::And(a, b) => f.debug_tuple("And").field(a).field(b).finish(),
            Expression::Or(a, b) => f.debug_tuple("Or").field(a).field(b).finish(),
            Expression::AnyField { entity, field } => f
                .debug_struct("AnyField")
                .field("entity", entity)
                .field("field", field)
                .finish(),
            Expression::SpecificField { entity, field } => f
                .debug_struct("SpecificField")
                .field("entity", entity)
                .field("field", field)
                .finish(),
            Expression::Noop => f.write_str("Noop"),
        }
    }
}
