//! # orrery
//!
//! Command-line replay and inspection over `orrery-core`.
//!
//! The binary in `main.rs` only parses arguments and initialises logging;
//! everything it runs lives in [`cli`] so it can be exercised from tests.

pub mod cli;
