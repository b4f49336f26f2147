//! Assetflow infrastructure
//!
//! Shared plumbing for the HTTP binary: tracing initialisation and request-id
//! middleware.

pub mod middleware;
pub mod telemetry;

pub use middleware::{get_request_id, request_id_middleware, RequestId, REQUEST_ID_HEADER};
pub use telemetry::init_telemetry;
