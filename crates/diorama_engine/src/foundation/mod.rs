//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and operations
//! - Colors parsed from and written to document hex strings
//! - Time management
//! - Logging utilities

pub mod math;
pub mod color;
pub mod time;
pub mod logging;
