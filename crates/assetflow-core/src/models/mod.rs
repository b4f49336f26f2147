//! Data models for the asset lifecycle.

mod asset;
mod content;
mod message;

pub use asset::*;
pub use content::*;
pub use message::*;
