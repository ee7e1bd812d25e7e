#![no_std]

// Polling core for a Hoymiles micro-inverter DTU.
//
// The crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Radio, payload assembly and time acquisition are
// reached through traits so the firmware and the emulator can plug in their
// own implementations.

pub mod app;
pub mod clock;
pub mod config;
pub mod console;
pub mod context;
pub mod coordinator;
pub mod drain;
pub mod inverter;
pub mod listener;
pub mod radio;
pub mod rx;
pub mod scheduler;
pub mod stats;
pub mod status;
pub mod sun;
pub mod telemetry;
