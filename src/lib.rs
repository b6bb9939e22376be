//! Resource sampler: CPU/memory/accelerator snapshots accumulated per
//! session and exported as CSV plus a JSON metadata document.

pub mod config;
pub mod export;
pub mod sampler;
pub mod session;
pub mod units;
