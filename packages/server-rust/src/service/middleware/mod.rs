//! Tower layers wrapped around every domain service.
//!
//! - [`observe`]: one span and one completion record per call
//! - [`pipeline`]: the composed stack

use std::future::Future;
use std::pin::Pin;

use super::operation::{OperationError, OperationResponse};

pub mod observe;
pub mod pipeline;

pub use observe::{Observe, ObserveLayer};
pub use pipeline::{build_operation_pipeline, OperationPipeline};

/// Future returned by every layer in the pipeline.
pub type OperationFuture =
    Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;
