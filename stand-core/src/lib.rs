#![no_std]

// Shared logic for the static test stand controller.
//
// This crate stays portable across the stand firmware and host tooling by
// avoiding the Rust standard library. Sensors, the fire-control line, and the
// ground-station transport plug in through the traits exposed here.

pub mod clock;
pub mod link;
pub mod protocol;
pub mod sensors;
pub mod sequencer;
pub mod telemetry;
