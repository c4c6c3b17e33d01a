pub mod queue;
pub mod runner;

pub use queue::{Job, JobKind, JobQueue};
pub use runner::{JobRunner, Workers};
