#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod device;
pub mod gatt;
pub mod measurement;
pub mod service;

// These modules depend on embassy/async features only available with embedded feature
#[cfg(feature = "embedded")]
pub mod ble;
#[cfg(feature = "embedded")]
pub mod tasks;
