//! Compiles declared checks into operation and commit expression trees.
//!
//! Both trees of one authorization point share the same check instances, so
//! a check that already ran in the operation phase is answered from the
//! permission cache at commit time.

use std::rc::Rc;

use crate::check::CheckFactory;
use crate::config::PermissionConfig;
use crate::dictionary::EntityDictionary;
use crate::error::PermissionError;
use crate::expression::{CheckInvocation, Expression};
use crate::extract::{CheckMode, CheckSubset, ExtractedChecks};
use crate::types::{ChangeSpec, PermissionKind, PersistentResource};

/// Operation- and commit-phase trees for one authorization point.
#[derive(Debug)]
pub struct Expressions<T> {
    operation: Expression<T>,
    commit: Expression<T>,
}

impl<T> Expressions<T> {
    /// Tree evaluated while mutations are still being staged.
    #[inline]
    pub fn operation(&self) -> &Expression<T> {
        &self.operation
    }

    /// Tree evaluated against the final state.
    #[inline]
    pub fn commit(&self) -> &Expression<T> {
        &self.commit
    }

    /// Split into `(operation, commit)`.
    pub fn into_parts(self) -> (Expression<T>, Expression<T>) {
        (self.operation, self.commit)
    }
}

/// Builds [`Expressions`] from dictionary declarations.
pub struct ExpressionBuilder<'a, T> {
    dictionary: &'a dyn EntityDictionary,
    factory: &'a dyn CheckFactory<T>,
    config: PermissionConfig,
}

/// Which leaf a check becomes.
#[derive(Clone, Copy)]
enum Phase {
    Operation,
    Commit,
}

impl<'a, T> ExpressionBuilder<'a, T> {
    /// Create a builder with default limits.
    pub fn new(dictionary: &'a dyn EntityDictionary, factory: &'a dyn CheckFactory<T>) -> Self {
        ExpressionBuilder::with_config(dictionary, factory, PermissionConfig::default())
    }

    /// Create a builder with explicit limits.
    pub fn with_config(
        dictionary: &'a dyn EntityDictionary,
        factory: &'a dyn CheckFactory<T>,
        config: PermissionConfig,
    ) -> Self {
        ExpressionBuilder {
            dictionary,
            factory,
            config,
        }
    }

    /// Build both trees for `resource`.
    ///
    /// With a `field`, the field rule replaces the entity rule when one is
    /// declared. Without one, access is granted if the entity rule or any
    /// single field rule grants it.
    pub fn build(
        &self,
        resource: &PersistentResource<T>,
        kind: PermissionKind,
        field: Option<&str>,
        change: Option<ChangeSpec>,
    ) -> Result<Expressions<T>, PermissionError> {
        let change = change.map(Rc::new);
        let expressions = match field {
            Some(field) => self.build_specific_field(resource, kind, field, change)?,
            None => self.build_any_field(resource, kind, change)?,
        };
        self.validate(&expressions.operation)?;
        self.validate(&expressions.commit)?;
        Ok(expressions)
    }

    fn build_specific_field(
        &self,
        resource: &PersistentResource<T>,
        kind: PermissionKind,
        field: &str,
        change: Option<Rc<ChangeSpec>>,
    ) -> Result<Expressions<T>, PermissionError> {
        let resource_type = resource.resource_type();
        let extracted =
            ExtractedChecks::extract(self.dictionary, resource_type, kind, Some(field))?;
        let entity = CheckSubset::instantiate(extracted.entity(), self.factory)?;
        let field_checks = CheckSubset::instantiate(extracted.field(), self.factory)?;
        trace_subsets(resource, kind, Some(field), &entity, &field_checks);

        let bind =
            |subset: &CheckSubset<T>, phase| group_expression(subset, phase, resource, &change);
        Ok(Expressions {
            operation: Expression::specific_field(
                bind(&entity, Phase::Operation),
                bind(&field_checks, Phase::Operation),
            ),
            commit: Expression::specific_field(
                bind(&entity, Phase::Commit),
                bind(&field_checks, Phase::Commit),
            ),
        })
    }

    /// OR of the entity rule and one term per declared field.
    ///
    /// Without an entity rule a field term is that field's own rule, and
    /// fields with no rule contribute nothing. Nothing declared at all
    /// yields `Noop`.
    fn build_any_field(
        &self,
        resource: &PersistentResource<T>,
        kind: PermissionKind,
        change: Option<Rc<ChangeSpec>>,
    ) -> Result<Expressions<T>, PermissionError> {
        let resource_type = resource.resource_type();
        let extracted = ExtractedChecks::extract(self.dictionary, resource_type, kind, None)?;
        let entity = CheckSubset::instantiate(extracted.entity(), self.factory)?;
        let no_field = CheckSubset::instantiate(None, self.factory)?;
        trace_subsets(resource, kind, None, &entity, &no_field);

        let bind =
            |subset: &CheckSubset<T>, phase| group_expression(subset, phase, resource, &change);
        let mut operation = None;
        let mut commit = None;
        if !entity.is_empty() {
            operation = Some(Expression::any_field(
                bind(&entity, Phase::Operation),
                Expression::Noop,
            ));
            commit = Some(Expression::any_field(
                bind(&entity, Phase::Commit),
                Expression::Noop,
            ));
        }

        for field in self.dictionary.fields(resource_type) {
            let extracted =
                ExtractedChecks::extract(self.dictionary, resource_type, kind, Some(&field))?;
            let field_checks = CheckSubset::instantiate(extracted.field(), self.factory)?;
            trace_subsets(resource, kind, Some(&field), &entity, &field_checks);

            let (operation_term, commit_term) = if !entity.is_empty() {
                (
                    Expression::any_field(
                        bind(&entity, Phase::Operation),
                        bind(&field_checks, Phase::Operation),
                    ),
                    Expression::any_field(
                        bind(&entity, Phase::Commit),
                        bind(&field_checks, Phase::Commit),
                    ),
                )
            } else if !field_checks.is_empty() {
                (
                    bind(&field_checks, Phase::Operation),
                    bind(&field_checks, Phase::Commit),
                )
            } else {
                continue;
            };
            operation = Some(or_term(operation, operation_term));
            commit = Some(or_term(commit, commit_term));
        }

        Ok(Expressions {
            operation: operation.unwrap_or(Expression::Noop),
            commit: commit.unwrap_or(Expression::Noop),
        })
    }

    fn validate(&self, expression: &Expression<T>) -> Result<(), PermissionError> {
        let depth = expression.depth();
        let max = self.config.max_expression_depth;
        if depth > max {
            tracing::warn!(depth, max, "permission expression too deep");
            return Err(PermissionError::ExpressionTooDeep { max, actual: depth });
        }
        Ok(())
    }
}

fn or_term<T>(acc: Option<Expression<T>>, term: Expression<T>) -> Expression<T> {
    match acc {
        Some(acc) => Expression::or(acc, term),
        None => term,
    }
}

/// Fold a group into a left-leaning AND/OR chain, preserving declaration
/// order. An empty group is a `Noop` leaf.
fn group_expression<T>(
    subset: &CheckSubset<T>,
    phase: Phase,
    resource: &PersistentResource<T>,
    change: &Option<Rc<ChangeSpec>>,
) -> Expression<T> {
    let leaf: fn(CheckInvocation<T>) -> Expression<T> = match phase {
        Phase::Operation => Expression::deferred,
        Phase::Commit => Expression::immediate,
    };
    let join: fn(Expression<T>, Expression<T>) -> Expression<T> = match subset.mode() {
        CheckMode::Any => Expression::or,
        CheckMode::All => Expression::and,
    };

    let mut leaves = subset.checks().iter().map(|check| {
        leaf(CheckInvocation::new(
            check.clone(),
            resource.clone(),
            change.clone(),
        ))
    });
    match leaves.next() {
        Some(first) => leaves.fold(first, join),
        None => Expression::Noop,
    }
}

fn trace_subsets<T>(
    resource: &PersistentResource<T>,
    kind: PermissionKind,
    field: Option<&str>,
    entity: &CheckSubset<T>,
    field_checks: &CheckSubset<T>,
) {
    tracing::trace!(
        resource_type = resource.resource_type(),
        %kind,
        field,
        entity_operation = entity.operation_checks().checks().len(),
        entity_commit = entity.commit_checks().checks().len(),
        field_operation = field_checks.operation_checks().checks().len(),
        field_commit = field_checks.commit_checks().checks().len(),
        "extracted checks"
    );
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::cache::PermissionCache;
    use crate::check::{Check, CheckId, CheckKind, CheckRegistry};
    use crate::dictionary::{EntityDefinition, StaticDictionary};
    use crate::extract::PermissionDeclaration;
    use crate::result::ExpressionResult;
    use crate::types::RequestScope;

    thread_local! {
        static CALLS: Cell<u32> = const { Cell::new(0) };
    }

    struct Fixed(bool, CheckKind);

    impl Check<()> for Fixed {
        fn ok(&self, _: &(), _: &RequestScope, _: Option<&ChangeSpec>) -> bool {
            CALLS.with(|c| c.set(c.get() + 1));
            self.0
        }

        fn kind(&self) -> CheckKind {
            self.1
        }
    }

    fn registry() -> CheckRegistry<()> {
        CheckRegistry::new()
            .with("allow", || {
                Box::new(Fixed(true, CheckKind::OPERATION)) as Box<dyn Check<()>>
            })
            .with("deny", || {
                Box::new(Fixed(false, CheckKind::OPERATION)) as Box<dyn Check<()>>
            })
            .with("later", || {
                Box::new(Fixed(true, CheckKind::COMMIT)) as Box<dyn Check<()>>
            })
    }

    fn resource() -> PersistentResource<()> {
        let scope = Rc::new(RequestScope::new("alice"));
        PersistentResource::new("book", Some("1".into()), (), scope)
    }

    fn calls() -> u32 {
        CALLS.with(Cell::get)
    }

    fn reset_calls() {
        CALLS.with(|c| c.set(0));
    }

    #[test]
    fn test_specific_field_uses_field_rule() {
        let title_rule = PermissionDeclaration::all(["allow", "allow"]);
        let dictionary = StaticDictionary::builder()
            .entity(
                EntityDefinition::new("book")
                    .field("title")
                    .field("author")
                    .permission(PermissionKind::Update, PermissionDeclaration::all(["deny"]))
                    .field_permission("title", PermissionKind::Update, title_rule),
            )
            .build()
            .unwrap();
        let registry = registry();
        let builder = ExpressionBuilder::new(&dictionary, &registry);
        let mut cache = PermissionCache::new();

        let title = builder
            .build(&resource(), PermissionKind::Update, Some("title"), None)
            .unwrap();
        let evaluation = title.operation().evaluate(&mut cache).unwrap();
        assert_eq!(evaluation.result, ExpressionResult::Pass);

        let author = builder
            .build(&resource(), PermissionKind::Update, Some("author"), None)
            .unwrap();
        let evaluation = author.operation().evaluate(&mut cache).unwrap();
        assert_eq!(evaluation.result, ExpressionResult::Fail);
    }

    #[test]
    fn test_trees_share_instances() {
        let dictionary = StaticDictionary::builder()
            .entity(
                EntityDefinition::new("book").permission(
                    PermissionKind::Update,
                    PermissionDeclaration::all(["allow", "later"]),
                ),
            )
            .build()
            .unwrap();
        let registry = registry();
        let builder = ExpressionBuilder::new(&dictionary, &registry);
        let expressions = builder
            .build(&resource(), PermissionKind::Update, Some("title"), None)
            .unwrap();
        let mut cache = PermissionCache::new();

        reset_calls();
        let operation = expressions.operation().evaluate(&mut cache).unwrap();
        assert_eq!(operation.result, ExpressionResult::Deferred);
        assert_eq!(calls(), 1);

        let commit = expressions.commit().evaluate(&mut cache).unwrap();
        assert_eq!(commit.result, ExpressionResult::Pass);
        assert_eq!(commit.stats.cache_hits, 1);
        assert_eq!(calls(), 2);
    }

    #[test]
    fn test_group_order_is_declaration_order() {
        let dictionary = StaticDictionary::builder()
            .entity(
                EntityDefinition::new("book").permission(
                    PermissionKind::Read,
                    PermissionDeclaration::any(["deny", "later", "allow"]),
                ),
            )
            .build()
            .unwrap();
        let registry = registry();
        let expressions = ExpressionBuilder::new(&dictionary, &registry)
            .build(&resource(), PermissionKind::Read, Some("title"), None)
            .unwrap();
        let ids: Vec<_> = expressions.commit().check_ids();
        let ids: Vec<_> = ids.iter().map(CheckId::as_str).collect();
        assert_eq!(ids, ["deny", "later", "allow"]);
    }

    #[test]
    fn test_nothing_declared_is_noop() {
        let dictionary = StaticDictionary::builder()
            .entity(EntityDefinition::new("book").field("title"))
            .build()
            .unwrap();
        let registry = registry();
        let builder = ExpressionBuilder::new(&dictionary, &registry);

        let expressions = builder
            .build(&resource(), PermissionKind::Delete, Some("title"), None)
            .unwrap();
        assert!(expressions.operation().is_noop());
        assert!(expressions.commit().is_noop());

        let expressions = builder
            .build(&resource(), PermissionKind::Delete, None, None)
            .unwrap();
        assert!(expressions.commit().is_noop());
    }

    #[test]
    fn test_any_field_ors_every_field() {
        let dictionary = StaticDictionary::builder()
            .entity(
                EntityDefinition::new("book")
                    .field("title")
                    .field("author")
                    .field("isbn")
                    .permission(PermissionKind::Read, PermissionDeclaration::all(["deny"]))
                    .field_permission(
                        "author",
                        PermissionKind::Read,
                        PermissionDeclaration::any(["allow"]),
                    ),
            )
            .build()
            .unwrap();
        let registry = registry();
        let expressions = ExpressionBuilder::new(&dictionary, &registry)
            .build(&resource(), PermissionKind::Read, None, None)
            .unwrap();

        // Entity term plus one term per field.
        let ids = expressions.commit().check_ids();
        let deny_terms = ids.iter().filter(|id| id.as_str() == "deny").count();
        assert_eq!(deny_terms, 4);

        let mut cache = PermissionCache::new();
        reset_calls();
        let evaluation = expressions.commit().evaluate(&mut cache).unwrap();
        assert_eq!(evaluation.result, ExpressionResult::Pass);
        // The entity instance is shared, so "deny" runs once; "allow" once.
        assert_eq!(calls(), 2);
    }

    #[test]
    fn test_any_field_without_entity_rule_uses_field_rules() {
        let dictionary = StaticDictionary::builder()
            .entity(
                EntityDefinition::new("book")
                    .field("title")
                    .field("author")
                    .field("isbn")
                    .field_permission(
                        "title",
                        PermissionKind::Read,
                        PermissionDeclaration::all(["deny"]),
                    )
                    .field_permission(
                        "isbn",
                        PermissionKind::Read,
                        PermissionDeclaration::all(["deny"]),
                    ),
            )
            .build()
            .unwrap();
        let registry = registry();
        let expressions = ExpressionBuilder::new(&dictionary, &registry)
            .build(&resource(), PermissionKind::Read, None, None)
            .unwrap();

        // No seed term and nothing for the undeclared author field.
        let ids = expressions.commit().check_ids();
        assert_eq!(ids, [CheckId::new("deny"), CheckId::new("deny")]);

        let mut cache = PermissionCache::new();
        reset_calls();
        let evaluation = expressions.commit().evaluate(&mut cache).unwrap();
        assert_eq!(evaluation.result, ExpressionResult::Fail);
        assert_eq!(calls(), 2);
    }

    #[test]
    fn test_depth_limit() {
        let dictionary = StaticDictionary::builder()
            .entity(
                EntityDefinition::new("book").permission(
                    PermissionKind::Read,
                    PermissionDeclaration::all(["allow", "allow", "allow"]),
                ),
            )
            .build()
            .unwrap();
        let registry = registry();
        let config = PermissionConfig {
            max_expression_depth: 3,
            ..PermissionConfig::default()
        };
        let err = ExpressionBuilder::with_config(&dictionary, &registry, config)
            .build(&resource(), PermissionKind::Read, Some("title"), None)
            .unwrap_err();
        assert_eq!(
            err,
            PermissionError::ExpressionTooDeep { max: 3, actual: 4 }
        );
    }

    #[test]
    fn test_unknown_check_is_configuration_error() {
        let dictionary = StaticDictionary::builder()
            .entity(
                EntityDefinition::new("book")
                    .permission(PermissionKind::Read, PermissionDeclaration::any(["ghost"])),
            )
            .build()
            .unwrap();
        let registry = registry();
        let err = ExpressionBuilder::new(&dictionary, &registry)
            .build(&resource(), PermissionKind::Read, None, None)
            .unwrap_err();
        assert_eq!(
            err,
            PermissionError::CheckNotInstantiable {
                check: CheckId::new("ghost")
            }
        );
    }
}
