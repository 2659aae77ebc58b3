//! Embassy tasks module
//!
//! Contains the async tasks of the firmware, organised by functionality.

pub mod ble;
pub mod sampler;

pub use ble::ble_task;
pub use sampler::sampler_task;
