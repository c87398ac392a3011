//! Phi-accrual failure detection (C3, §2).

pub mod arrival_window;
pub mod phi;

pub use phi::{FailureDetector, Suspicion};
