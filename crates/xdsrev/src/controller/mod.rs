//! Reconciliation controller.
//!
//! Two cooperating loops share one [`Context`]:
//! - the DesiredConfig loop records each declared bundle as a Revision,
//!   keeps the bounded history, and picks the version to publish
//!   (rolling back past tainted revisions);
//! - the Revision loop loads the published revision and pushes it to the
//!   snapshot cache, tainting it if its content does not load.
//!
//! [`Controller`] wires both to store events through a de-duplicating
//! [`WorkQueue`].

pub mod context;
pub mod desired_config;
pub mod error;
pub mod feedback;
pub mod predicates;
pub mod queue;
pub mod revision;
pub mod revision_store;
pub mod runner;
pub mod secrets;
pub mod selector;

pub use context::Context;
pub use desired_config::{reconcile_config, ConfigOutcome};
pub use error::ReconcileError;
pub use feedback::on_node_rejected;
pub use queue::WorkQueue;
pub use revision::{reconcile_revision, RevisionOutcome};
pub use runner::{Controller, WorkItem};
pub use selector::select_version;
