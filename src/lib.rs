//! Polymarket Copy-Trading Bot - Main Library
//!
//! Thin facade over the `copytrader` workspace library. Binaries live in
//! `src/bin/`:
//!
//! - `copy_trader`: the long-running engine daemon.
//! - `copyctl`: publishes task commands to a running engine.

// Re-export the core workspace library
pub use copytrader;
