//! Application layer: the operations, the orchestration pipeline and the
//! reconciliation engine. Everything here talks to storage and the processor
//! only through the domain ports.

pub mod mirror;
pub mod payments;
pub mod pipeline;
pub mod reconciler;
