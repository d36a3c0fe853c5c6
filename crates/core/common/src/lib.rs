//! Shared constants and size arithmetic for the repetition-tester workspace

pub mod constants;
pub mod units;

pub use units::{align_up, is_power_of_two};
