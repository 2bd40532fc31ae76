//! Property tests for the tri-state algebra and short-circuit evaluation.

use std::cell::RefCell;
use std::rc::Rc;

use checkgate::{
    ChangeSpec, Check, CheckId, CheckInstance, CheckInvocation, CheckKind, Expression,
    ExpressionResult, PermissionCache, PersistentResource, RequestScope,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use checkgate::ExpressionResult::{Deferred, Fail, Pass};

#[derive(Debug, Clone)]
enum Tree {
    Leaf(ExpressionResult),
    And(Box<Tree>, Box<Tree>),
    Or(Box<Tree>, Box<Tree>),
}

impl Tree {
    fn leaves(&self) -> usize {
        match self {
            Tree::Leaf(_) => 1,
            Tree::And(a, b) | Tree::Or(a, b) => a.leaves() + b.leaves(),
        }
    }
}

fn arb_result() -> impl Strategy<Value = ExpressionResult> {
    prop_oneof![Just(Pass), Just(Fail), Just(Deferred)]
}

fn arb_tree() -> impl Strategy<Value = Tree> {
    arb_result()
        .prop_map(Tree::Leaf)
        .prop_recursive(8, 128, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone())
                    .prop_map(|(a, b)| Tree::And(Box::new(a), Box::new(b))),
                (inner.clone(), inner).prop_map(|(a, b)| Tree::Or(Box::new(a), Box::new(b))),
            ]
        })
}

/// Check that logs its leaf index when invoked.
struct Recording {
    index: usize,
    verdict: bool,
    kind: CheckKind,
    log: Rc<RefCell<Vec<usize>>>,
}

impl Check<()> for Recording {
    fn ok(&self, _: &(), _: &RequestScope, _: Option<&ChangeSpec>) -> bool {
        self.log.borrow_mut().push(self.index);
        self.verdict
    }

    fn kind(&self) -> CheckKind {
        self.kind
    }
}

/// Compile to an operation-phase expression. `Deferred` leaves are
/// commit-only checks, the others operation checks with a fixed verdict.
fn compile(
    tree: &Tree,
    next: &mut usize,
    resource: &PersistentResource<()>,
    log: &Rc<RefCell<Vec<usize>>>,
) -> Expression<()> {
    match tree {
        Tree::Leaf(result) => {
            let index = *next;
            *next += 1;
            let check = Recording {
                index,
                verdict: result.is_pass(),
                kind: if result.is_deferred() {
                    CheckKind::COMMIT
                } else {
                    CheckKind::OPERATION
                },
                log: Rc::clone(log),
            };
            let id = CheckId::new(format!("leaf{index}"));
            let instance = CheckInstance::new(id, Box::new(check)).unwrap();
            Expression::deferred(CheckInvocation::new(instance, resource.clone(), None))
        }
        Tree::And(a, b) => {
            let left = compile(a, next, resource, log);
            Expression::and(left, compile(b, next, resource, log))
        }
        Tree::Or(a, b) => {
            let left = compile(a, next, resource, log);
            Expression::or(left, compile(b, next, resource, log))
        }
    }
}

/// Recursive model: result plus the leaves a short-circuiting evaluator runs.
fn reference(tree: &Tree, next: &mut usize, invoked: &mut Vec<usize>) -> ExpressionResult {
    match tree {
        Tree::Leaf(result) => {
            if !result.is_deferred() {
                invoked.push(*next);
            }
            *next += 1;
            *result
        }
        Tree::And(a, b) => {
            let left = reference(a, next, invoked);
            if left.is_fail() {
                *next += b.leaves();
                Fail
            } else {
                left.and(reference(b, next, invoked))
            }
        }
        Tree::Or(a, b) => {
            let left = reference(a, next, invoked);
            if left.is_pass() {
                *next += b.leaves();
                Pass
            } else {
                left.or(reference(b, next, invoked))
            }
        }
    }
}

fn resource() -> PersistentResource<()> {
    PersistentResource::new("leaf", None, (), Rc::new(RequestScope::anonymous()))
}

proptest! {
    #[test]
    fn prop_and_or_commutative(a in arb_result(), b in arb_result()) {
        prop_assert_eq!(a.and(b), b.and(a));
        prop_assert_eq!(a.or(b), b.or(a));
    }

    #[test]
    fn prop_and_or_associative(a in arb_result(), b in arb_result(), c in arb_result()) {
        prop_assert_eq!(a.and(b).and(c), a.and(b.and(c)));
        prop_assert_eq!(a.or(b).or(c), a.or(b.or(c)));
    }

    #[test]
    fn prop_agrees_with_bool(a in any::<bool>(), b in any::<bool>()) {
        let (x, y) = (ExpressionResult::from_bool(a), ExpressionResult::from_bool(b));
        prop_assert_eq!(x.and(y), ExpressionResult::from_bool(a && b));
        prop_assert_eq!(x.or(y), ExpressionResult::from_bool(a || b));
    }

    #[test]
    fn prop_lazy_matches_eager(a in arb_result(), b in arb_result()) {
        prop_assert_eq!(a.and_then(|| b), a.and(b));
        prop_assert_eq!(a.or_else(|| b), a.or(b));
    }

    #[test]
    fn prop_evaluator_matches_reference(tree in arb_tree()) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let expression = compile(&tree, &mut 0, &resource(), &log);

        let mut expected = Vec::new();
        let expected_result = reference(&tree, &mut 0, &mut expected);

        let mut cache = PermissionCache::new();
        let evaluation = expression.evaluate(&mut cache).unwrap();
        prop_assert_eq!(evaluation.result, expected_result);
        prop_assert_eq!(&*log.borrow(), &expected);
        prop_assert_eq!(evaluation.stats.checks_invoked as usize, expected.len());
    }

    #[test]
    fn prop_second_evaluation_is_cached(tree in arb_tree()) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let expression = compile(&tree, &mut 0, &resource(), &log);
        let mut cache = PermissionCache::new();

        let first = expression.evaluate(&mut cache).unwrap();
        let invoked = log.borrow().len();
        let second = expression.evaluate(&mut cache).unwrap();

        prop_assert_eq!(first.result, second.result);
        prop_assert_eq!(log.borrow().len(), invoked);
        prop_assert_eq!(second.stats.checks_invoked, 0);
        prop_assert_eq!(second.stats.cache_hits as usize, invoked);
    }
}

#[test]
fn test_and_table() {
    let table = [
        (Pass, Pass, Pass),
        (Pass, Fail, Fail),
        (Pass, Deferred, Deferred),
        (Fail, Pass, Fail),
        (Fail, Fail, Fail),
        (Fail, Deferred, Fail),
        (Deferred, Pass, Deferred),
        (Deferred, Fail, Fail),
        (Deferred, Deferred, Deferred),
    ];
    let actual: Vec<_> = table.iter().map(|&(a, b, _)| (a, b, a.and(b))).collect();
    assert_eq!(actual, table);
}

#[test]
fn test_or_table() {
    let table = [
        (Pass, Pass, Pass),
        (Pass, Fail, Pass),
        (Pass, Deferred, Pass),
        (Fail, Pass, Pass),
        (Fail, Fail, Fail),
        (Fail, Deferred, Deferred),
        (Deferred, Pass, Pass),
        (Deferred, Fail, Deferred),
        (Deferred, Deferred, Deferred),
    ];
    let actual: Vec<_> = table.iter().map(|&(a, b, _)| (a, b, a.or(b))).collect();
    assert_eq!(actual, table);
}
