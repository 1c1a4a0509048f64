//! Domain service layer.
//!
//! 1. **Operations** (`operation`): the five canonical calls and their errors
//! 2. **Domain service** (`domain`): store access plus one audit event per call
//! 3. **Middleware** (`middleware`): per-call tracing

pub mod config;
pub mod domain;
pub mod middleware;
pub mod operation;

pub use config::{EmissionMode, ServiceConfig};
pub use domain::DomainService;
pub use middleware::{build_operation_pipeline, OperationPipeline};
pub use operation::{
    CallerOrigin, Operation, OperationContext, OperationError, OperationResponse,
};
