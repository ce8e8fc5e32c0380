//! GLRT Renderer - acceleration structure and GPU data preparation.
//!
//! Builds a binary BVH over the scene's triangles (SAH for large ranges,
//! median split for small ones) and packs the hierarchy plus all scene arrays
//! into fixed-layout float records for texture-buffer upload.

mod primitive;

pub mod bvh;
pub mod gpu;
pub mod prepare;

pub use bvh::{Bvh, BvhConfig, BvhError, BvhNode, BvhResult};
pub use gpu::{
    GpuMaterial, GpuMedium, GpuNode, GpuRecord, GpuTriangle, GpuVertex, PackError, PackedBuffer,
    SceneBuffers, TexelFormat,
};
pub use prepare::{prepare, PrepareError, PrepareResult, PreparedScene};
pub use primitive::{extract_primitives, PrimitiveInfo};
