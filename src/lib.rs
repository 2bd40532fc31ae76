//! # checkgate
//!
//! A two-phase authorization core for staged units of work.
//!
//! Resource types declare, per permission kind, which checks guard them at
//! the entity level and optionally per field. Each declaration lists its
//! checks in ANY (OR) or ALL (AND) mode. For every authorization point the
//! [`ExpressionBuilder`] compiles those declarations into two expression
//! trees:
//!
//! - the **operation tree**, evaluated while mutations are still staged.
//!   Commit-only checks answer `Deferred` here without running;
//! - the **commit tree**, evaluated against the final state. Every check
//!   runs.
//!
//! [`PermissionExecutor`] evaluates operation trees as requests arrive,
//! queues the commit tree of every undecided point, and drains that queue
//! in FIFO order from [`PermissionExecutor::check_commit_permissions`].
//! A per-request [`PermissionCache`] guarantees each check instance runs at
//! most once per request.
//!
//! ## Evaluation
//!
//! Results are tri-state ([`ExpressionResult`]). AND stops at the first
//! `Fail`, OR at the first `Pass`, and a skipped operand's check is never
//! invoked. Trees are evaluated and dropped with an explicit stack.
//!
//! ## Example
//!
//! ```
//! use std::rc::Rc;
//! use checkgate::{
//!     Check, CheckKind, CheckRegistry, ChangeSpec, EntityDefinition, PermissionDeclaration,
//!     PermissionExecutor, PermissionKind, PersistentResource, RequestScope, StaticDictionary,
//! };
//!
//! struct Book {
//!     owner: String,
//! }
//!
//! struct IsOwner;
//!
//! impl Check<Book> for IsOwner {
//!     fn ok(&self, book: &Book, scope: &RequestScope, _: Option<&ChangeSpec>) -> bool {
//!         scope.principal.as_deref() == Some(book.owner.as_str())
//!     }
//!
//!     fn kind(&self) -> CheckKind {
//!         CheckKind::COMMIT
//!     }
//! }
//!
//! let dictionary = StaticDictionary::builder()
//!     .entity(
//!         EntityDefinition::new("book").permission(
//!             PermissionKind::Create,
//!             PermissionDeclaration::all(["is_owner"]),
//!         ),
//!     )
//!     .build()?;
//! let registry = CheckRegistry::new()
//!     .with("is_owner", || Box::new(IsOwner) as Box<dyn Check<Book>>);
//!
//! let scope = Rc::new(RequestScope::new("alice"));
//! let mut executor = PermissionExecutor::new(&dictionary, &registry, Rc::clone(&scope));
//!
//! let owner = String::new();
//! let book = PersistentResource::new("book", None, Book { owner }, Rc::clone(&scope));
//! executor.check_permission(&book, PermissionKind::Create, None, None)?;
//! assert_eq!(executor.pending_commit_checks(), 1);
//!
//! book.object_mut()?.owner = "alice".into();
//! executor.check_commit_permissions()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod cache;
pub mod check;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod executor;
pub mod expression;
pub mod extract;
pub mod loader;
pub mod result;
pub mod stats;
pub mod types;
pub mod value;

pub use builder::{ExpressionBuilder, Expressions};
pub use cache::PermissionCache;
pub use check::{Check, CheckFactory, CheckId, CheckInstance, CheckKind, CheckRegistry, InstanceId};
pub use config::PermissionConfig;
pub use dictionary::{EntityDefinition, EntityDictionary, StaticDictionary, StaticDictionaryBuilder};
pub use error::{ForbiddenAccess, PermissionError, Result};
pub use executor::{CommitCheckQueue, PermissionExecutor};
pub use expression::{CheckInvocation, Evaluation, Expression};
pub use extract::{CheckGroup, CheckMode, CheckSubset, ExtractedChecks, PermissionDeclaration};
pub use loader::{load_dictionary_file, parse_dictionary, LoadError};
pub use result::ExpressionResult;
pub use stats::EvaluationStats;
pub use types::{ChangeSpec, PermissionKind, PersistentResource, RequestScope, SecurityMode};
pub use value::Value;
