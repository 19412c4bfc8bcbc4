#![forbid(unsafe_code)]
//! autoabr-ladder: from a cloud of (bitrate, resolution, VMAF) samples to an ABR ladder.
//!
//! Responsibilities:
//! - Reduce samples to one optimum per target bitrate (highest score wins).
//! - Walk the optima from the highest bitrate down, keeping a rung only when it
//!   is a meaningfully different trade-off from the previous one.
//! - Debug helpers that check ladder shape.
//!
//! **No I/O, no async** here. Results arrive already parsed.

pub mod error;
pub mod optimum;
pub mod policy;
pub mod select;
pub mod verify;

pub use error::{Error, Result};
pub use optimum::{per_bitrate_optimum, samples_from_results};
pub use policy::LadderPolicy;
pub use select::{build_ladder, select_ladder, LadderSelector, SelectionMode};
