//! Editing helpers
//!
//! The transform gizmo and the ground grid. Both are helper nodes: excluded
//! from scene picking and never written to a saved document.

pub mod gizmo;
pub mod grid;

pub use gizmo::{GizmoAxis, GizmoState, Handle, TransformGizmo};
pub use grid::{spawn_grid, GridOptions};
