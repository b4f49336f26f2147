//! Assetflow HTTP service.
//!
//! Serves stored media with byte-range support, exposes the storage surface used by
//! remote gateways, and the asset lifecycle endpoints. The binary in `main.rs` wires
//! it together; the modules are public for integration tests.

pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;
