mod controller;
mod converge;
mod ownership;
mod reconciler;

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod remote;
pub mod statemachine;
pub mod telemetry;
pub mod templates;

#[cfg(test)]
mod fixtures;

pub use crate::controller::run_controller;
pub use crate::converge::{ensure, OperationResult};
pub use crate::ownership::{bind_controller, controller_reference};
pub use crate::reconciler::WorkerReconciler;
