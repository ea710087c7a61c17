pub mod alignment;
#[cfg(feature = "desktop")]
pub mod calibration;
#[cfg(feature = "desktop")]
pub mod camera;
pub mod config;
pub mod driver;
pub mod frame_slot;
pub mod logging;
pub mod pose;
#[cfg(feature = "desktop")]
pub mod render;
pub mod tracker;
