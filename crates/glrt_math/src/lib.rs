// Re-export glam for convenience
pub use glam::*;

// GLRT math types
mod bounds;
mod camera;
pub use bounds::{Bounds, BOUNDS_SENTINEL};
pub use camera::Camera;
