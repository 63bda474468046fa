//! Domain models - the deadline engine
//!
//! This module contains the pure core of the system:
//! - `types` - canonical data types (`Plate`, `EventKind`, records)
//! - `normalize` - raw spreadsheet rows into typed observations
//! - `reconcile` - one winning record per (plate, kind)
//! - `window` - bucketing records into upcoming/expired
//! - `summary` - deterministic report rendering
//!
//! Everything here is synchronous and side-effect free; the services layer
//! drives it.

pub mod normalize;
pub mod reconcile;
pub mod summary;
pub mod types;
pub mod window;

// Re-export commonly used types at module level
pub use normalize::RawRow;
pub use reconcile::reconcile;
pub use types::{DeadlineRecord, DocRefs, EventKind, Observation, Plate};
pub use window::{classify, WindowReport};
