//! Per-triangle records consumed by the BVH builder.

use glrt_math::{Bounds, Vec3};

use crate::bvh::{BvhError, BvhResult};

/// A triangle prepared for spatial partitioning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitiveInfo {
    /// Position of the triangle in the original index list
    pub index: u32,
    pub vertices: [Vec3; 3],
    /// Tight box around the three vertices
    pub bounds: Bounds,
    /// Unweighted mean of the three vertices
    pub centroid: Vec3,
}

impl PrimitiveInfo {
    pub fn new(index: u32, v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self {
            index,
            vertices: [v0, v1, v2],
            bounds: Bounds::from_triangle(v0, v1, v2),
            centroid: (v0 + v1 + v2) / 3.0,
        }
    }
}

/// Build one `PrimitiveInfo` per triangle of a flat index list, in triangle order.
///
/// Rejects index lists whose length is not a multiple of 3 and indices that
/// fall outside `positions`.
pub fn extract_primitives(positions: &[Vec3], indices: &[u32]) -> BvhResult<Vec<PrimitiveInfo>> {
    if indices.len() % 3 != 0 {
        return Err(BvhError::UnalignedIndices(indices.len()));
    }

    let triangle_count = indices.len() / 3;
    if triangle_count > crate::bvh::MAX_TRIANGLES {
        return Err(BvhError::TooManyTriangles(triangle_count));
    }

    let vertex = |triangle: usize, index: u32| {
        positions
            .get(index as usize)
            .copied()
            .ok_or(BvhError::IndexOutOfRange {
                triangle,
                index,
                vertex_count: positions.len(),
            })
    };

    indices
        .chunks_exact(3)
        .enumerate()
        .map(|(i, tri)| {
            Ok(PrimitiveInfo::new(
                i as u32,
                vertex(i, tri[0])?,
                vertex(i, tri[1])?,
                vertex(i, tri[2])?,
            ))
        })
        .collect()
}
