//! # tinykern
//!
//! A small preemptive kernel for a single x86-64 core.
//!
//! The crate is built around three pieces that depend on each other:
//!
//! - [`interrupts`]: gate descriptor table, 8259 PIC acknowledgment and a
//!   per-vector handler registry. The timer vector drives the scheduler.
//! - [`task`]: per-task stacks and a round-robin schedule of saved
//!   register snapshots.
//! - [`memory`]: the first-fit free-list heap behind `#[global_allocator]`.
//!
//! Thin PS/2 keyboard and mouse drivers live in [`drivers`]; boot sequencing
//! lives in [`kernel`].
//!
//! The library is `no_std` when built for `x86_64-unknown-none`. On a hosted
//! target it links `std` so the core logic can be unit tested with
//! `cargo test`; everything that touches real hardware is gated on
//! `target_os = "none"` or sits behind a trait.

#![cfg_attr(target_os = "none", no_std)]

extern crate alloc;

#[macro_use]
pub mod serial;

pub mod arch;
pub mod config;
pub mod drivers;
pub mod interrupts;
pub mod kernel;
pub mod logging;
pub mod memory;
pub mod task;
