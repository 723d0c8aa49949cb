//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Sweep: Removes expired and over-threshold records at configured intervals

mod cleanup;

pub use cleanup::spawn_cleanup_task;
