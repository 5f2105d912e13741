//! Data models for the offline sync engine.
//!
//! Wire shapes use camelCase to match the remote draft API exactly.

mod cache;
mod draft;
mod pending;
mod record;

pub use cache::*;
pub use draft::*;
pub use pending::*;
pub use record::*;
