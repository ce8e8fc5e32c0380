//! GLRT Core - scene description and geometry loading.
//!
//! This crate provides:
//!
//! - **Meshes**: OBJ loading with synthesized normals and tangent frames
//! - **Scenes**: the JSON scene file, flattened into vertex/triangle/material/light arrays
//! - **Volumes**: dense voxel grids in the binary VOL format for participating media
//!
//! # Example
//!
//! ```ignore
//! use glrt_core::Scene;
//!
//! let scene = Scene::load("scenes/cornell_box.json")?;
//! println!("Loaded {} triangles, {} lights",
//!     scene.triangle_count(),
//!     scene.light_count());
//! ```

pub mod mesh;
pub mod scene;
pub mod volume;

// Re-export commonly used types
pub use mesh::{Mesh, MeshError, Vertex};
pub use scene::{Material, Medium, Scene, SceneDescription, SceneError, SceneResult, Triangle};
pub use volume::{Volume, VolumeError};
