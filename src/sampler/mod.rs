pub mod accel;
pub mod collector;
pub mod snapshot;

pub use collector::Sampler;
