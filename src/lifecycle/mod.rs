//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Application event loop
//!     → shutdown.rs (exit signal handle)
//!     → receive loops observe the signal at each suspension point
//!     → in-flight receives abort with a cancellation error
//! ```
//!
//! # Design Decisions
//! - Signal is level-triggered: late subscribers observe it too
//! - Triggering never blocks and is safe from any task

pub mod shutdown;

pub use shutdown::Shutdown;
