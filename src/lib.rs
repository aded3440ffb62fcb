//! Herd Simulation Engine Library
//!
//! Plays back a recorded day of herd sensor data as a live feed and builds
//! compressed state timelines from it.

pub mod sim;
