//! Tri-state evaluation results.
//!
//! `Pass` and `Fail` are final. `Deferred` means the outcome depends on
//! state that only exists once every mutation in the unit of work has been
//! staged, so the expression has to be evaluated again at commit time.

/// The outcome of evaluating an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionResult {
    /// Access is granted.
    Pass,
    /// Access is denied.
    Fail,
    /// Not decidable yet; must be re-evaluated at commit time.
    Deferred,
}

impl ExpressionResult {
    /// Map a check's boolean answer onto a final result.
    #[inline]
    pub const fn from_bool(ok: bool) -> Self {
        if ok {
            ExpressionResult::Pass
        } else {
            ExpressionResult::Fail
        }
    }

    /// Returns `true` if this result is `Pass`.
    #[inline]
    pub fn is_pass(&self) -> bool {
        matches!(self, ExpressionResult::Pass)
    }

    /// Returns `true` if this result is `Fail`.
    #[inline]
    pub fn is_fail(&self) -> bool {
        matches!(self, ExpressionResult::Fail)
    }

    /// Returns `true` if this result is `Deferred`.
    #[inline]
    pub fn is_deferred(&self) -> bool {
        matches!(self, ExpressionResult::Deferred)
    }

    /// Combine two already-computed results with AND semantics.
    ///
    /// Any `Fail` wins, then any `Deferred`, otherwise `Pass`.
    pub fn and(self, rhs: ExpressionResult) -> ExpressionResult {
        match (self, rhs) {
            (ExpressionResult::Fail, _) | (_, ExpressionResult::Fail) => ExpressionResult::Fail,
            (ExpressionResult::Deferred, _) | (_, ExpressionResult::Deferred) => {
                ExpressionResult::Deferred
            }
            (ExpressionResult::Pass, ExpressionResult::Pass) => ExpressionResult::Pass,
        }
    }

    /// Combine two already-computed results with OR semantics.
    ///
    /// Any `Pass` wins, then any `Deferred`, otherwise `Fail`.
    pub fn or(self, rhs: ExpressionResult) -> ExpressionResult {
        match (self, rhs) {
            (ExpressionResult::Pass, _) | (_, ExpressionResult::Pass) => ExpressionResult::Pass,
            (ExpressionResult::Deferred, _) | (_, ExpressionResult::Deferred) => {
                ExpressionResult::Deferred
            }
            (ExpressionResult::Fail, ExpressionResult::Fail) => ExpressionResult::Fail,
        }
    }

    /// Lazy AND: `rhs` is only computed when `self` is not `Fail`.
    pub fn and_then<F>(self, rhs: F) -> ExpressionResult
    where
        F: FnOnce() -> ExpressionResult,
    {
        if self.is_fail() {
            return ExpressionResult::Fail;
        }
        self.and(rhs())
    }

    /// Lazy OR: `rhs` is only computed when `self` is not `Pass`.
    pub fn or_else<F>(self, rhs: F) -> ExpressionResult
    where
        F: FnOnce() -> ExpressionResult,
    {
        if self.is_pass() {
            return ExpressionResult::Pass;
        }
        self.or(rhs())
    }
}

impl From<bool> for ExpressionResult {
    fn from(ok: bool) -> Self {
        ExpressionResult::from_bool(ok)
    }
}
