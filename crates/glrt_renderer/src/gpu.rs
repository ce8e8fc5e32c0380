//! Fixed-layout records for the shader stage's texture buffers.
//!
//! Every record is a run of 32-bit float texels (RGB32F or RGBA32F), so field
//! order and width here must match the shader's fetch code exactly. Indices are
//! stored as floats; `-1.0` marks an unused slot.

use bytemuck::{Pod, Zeroable};
use glrt_core::{Material, Medium, Scene, Triangle, Vertex};
use thiserror::Error;

use crate::bvh::{Bvh, BvhNode};

/// Marks an unused child/triangle/texture slot.
pub const NO_INDEX: f32 = -1.0;

/// Integers at or above this value are not exactly representable as `f32`.
pub const MAX_EXACT_INDEX: u32 = 1 << 24;

/// Errors that can occur while packing scene data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PackError {
    #[error("{what} index {value} cannot be represented exactly in a 32-bit float texel")]
    IndexNotRepresentable { what: &'static str, value: u32 },
}

pub type PackResult<T> = Result<T, PackError>;

fn index_texel(value: u32, what: &'static str) -> PackResult<f32> {
    if value >= MAX_EXACT_INDEX {
        return Err(PackError::IndexNotRepresentable { what, value });
    }
    Ok(value as f32)
}

/// Channel layout of one texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexelFormat {
    Rgb32F,
    Rgba32F,
}

impl TexelFormat {
    pub fn components(self) -> usize {
        match self {
            TexelFormat::Rgb32F => 3,
            TexelFormat::Rgba32F => 4,
        }
    }

    /// Bytes per texel.
    pub fn texel_size(self) -> usize {
        self.components() * std::mem::size_of::<f32>()
    }
}

/// A record that occupies a fixed number of texels in a texture buffer.
pub trait GpuRecord: Pod {
    const FORMAT: TexelFormat;
    const TEXELS: usize;
}

/// BVH node: `children = (left, right, triangle)`.
///
/// Leaves store `(-1, -1, triangle)`, forks `(left, right, -1)`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuNode {
    pub bbox_min: [f32; 3],
    pub bbox_max: [f32; 3],
    pub children: [f32; 3],
}

impl GpuRecord for GpuNode {
    const FORMAT: TexelFormat = TexelFormat::Rgb32F;
    const TEXELS: usize = 3;
}

impl GpuNode {
    pub fn from_node(node: &BvhNode) -> PackResult<Self> {
        let children = match *node {
            BvhNode::Leaf { triangle, .. } => {
                [NO_INDEX, NO_INDEX, index_texel(triangle, "triangle")?]
            }
            BvhNode::Fork { left, right, .. } => [
                index_texel(left, "node")?,
                index_texel(right, "node")?,
                NO_INDEX,
            ],
        };
        let bounds = node.bounds();
        Ok(Self {
            bbox_min: bounds.min.to_array(),
            bbox_max: bounds.max.to_array(),
            children,
        })
    }

    pub fn is_leaf(&self) -> bool {
        self.children[0] == NO_INDEX && self.children[1] == NO_INDEX
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 3],
    pub tangent: [f32; 3],
    pub binormal: [f32; 3],
}

impl GpuRecord for GpuVertex {
    const FORMAT: TexelFormat = TexelFormat::Rgb32F;
    const TEXELS: usize = 5;
}

impl From<&Vertex> for GpuVertex {
    fn from(v: &Vertex) -> Self {
        Self {
            position: v.position.to_array(),
            normal: v.normal.to_array(),
            uv: v.uv.to_array(),
            tangent: v.tangent.to_array(),
            binormal: v.binormal.to_array(),
        }
    }
}

/// Triangle as `(i, j, k, material)`. Also used for the light list.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuTriangle {
    pub indices: [f32; 4],
}

impl GpuRecord for GpuTriangle {
    const FORMAT: TexelFormat = TexelFormat::Rgba32F;
    const TEXELS: usize = 1;
}

impl GpuTriangle {
    pub fn from_triangle(tri: &Triangle) -> PackResult<Self> {
        Ok(Self {
            indices: [
                index_texel(tri.indices[0], "vertex")?,
                index_texel(tri.indices[1], "vertex")?,
                index_texel(tri.indices[2], "vertex")?,
                index_texel(tri.material, "material")?,
            ],
        })
    }
}

/// Material: emission, reflectance and `(density_slot, temperature_slot, 0)`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub emission: [f32; 3],
    pub reflectance: [f32; 3],
    pub volume: [f32; 3],
}

impl GpuRecord for GpuMaterial {
    const FORMAT: TexelFormat = TexelFormat::Rgb32F;
    const TEXELS: usize = 3;
}

/// 3D texture slots `(density, temperature)` of medium `m`.
pub fn medium_texture_slots(m: u32) -> (u32, u32) {
    (2 * m, 2 * m + 1)
}

impl GpuMaterial {
    pub fn from_material(material: &Material) -> PackResult<Self> {
        let volume = match material.medium {
            Some(m) => {
                let (density, temperature) = medium_texture_slots(m);
                [
                    index_texel(density, "texture slot")?,
                    index_texel(temperature, "texture slot")?,
                    0.0,
                ]
            }
            None => [NO_INDEX, NO_INDEX, 0.0],
        };
        Ok(Self {
            emission: material.emission.to_array(),
            reflectance: material.reflectance.to_array(),
            volume,
        })
    }
}

/// Medium bounds and `(max_density, density_slot, temperature_slot)`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuMedium {
    pub bbox_min: [f32; 3],
    pub bbox_max: [f32; 3],
    pub params: [f32; 3],
}

impl GpuRecord for GpuMedium {
    const FORMAT: TexelFormat = TexelFormat::Rgb32F;
    const TEXELS: usize = 3;
}

impl GpuMedium {
    pub fn from_medium(id: u32, medium: &Medium) -> PackResult<Self> {
        let (density, temperature) = medium_texture_slots(id);
        Ok(Self {
            bbox_min: medium.bbox_min.to_array(),
            bbox_max: medium.bbox_max.to_array(),
            params: [
                medium.density.max_value,
                index_texel(density, "texture slot")?,
                index_texel(temperature, "texture slot")?,
            ],
        })
    }
}

/// Byte view of one record array, ready for a texture-buffer upload.
#[derive(Debug, Clone, Copy)]
pub struct PackedBuffer<'a> {
    pub format: TexelFormat,
    pub texel_count: usize,
    pub bytes: &'a [u8],
}

impl<'a> PackedBuffer<'a> {
    pub fn new<T: GpuRecord>(records: &'a [T]) -> Self {
        Self {
            format: T::FORMAT,
            texel_count: records.len() * T::TEXELS,
            bytes: bytemuck::cast_slice(records),
        }
    }
}

/// All shader-visible scene arrays.
#[derive(Debug, Clone, Default)]
pub struct SceneBuffers {
    pub nodes: Vec<GpuNode>,
    pub vertices: Vec<GpuVertex>,
    pub triangles: Vec<GpuTriangle>,
    pub materials: Vec<GpuMaterial>,
    pub lights: Vec<GpuTriangle>,
    pub media: Vec<GpuMedium>,
}

impl SceneBuffers {
    /// Copy a scene and its hierarchy into shader record layout.
    pub fn pack(scene: &Scene, bvh: &Bvh) -> PackResult<Self> {
        Ok(Self {
            nodes: pack_nodes(bvh.nodes())?,
            vertices: scene.vertices.iter().map(GpuVertex::from).collect(),
            triangles: scene
                .triangles
                .iter()
                .map(GpuTriangle::from_triangle)
                .collect::<PackResult<_>>()?,
            materials: scene
                .materials
                .iter()
                .map(GpuMaterial::from_material)
                .collect::<PackResult<_>>()?,
            lights: scene
                .lights
                .iter()
                .map(GpuTriangle::from_triangle)
                .collect::<PackResult<_>>()?,
            media: scene
                .media
                .iter()
                .enumerate()
                .map(|(i, m)| GpuMedium::from_medium(i as u32, m))
                .collect::<PackResult<_>>()?,
        })
    }

    pub fn node_buffer(&self) -> PackedBuffer<'_> {
        PackedBuffer::new(&self.nodes)
    }

    pub fn vertex_buffer(&self) -> PackedBuffer<'_> {
        PackedBuffer::new(&self.vertices)
    }

    pub fn triangle_buffer(&self) -> PackedBuffer<'_> {
        PackedBuffer::new(&self.triangles)
    }

    pub fn material_buffer(&self) -> PackedBuffer<'_> {
        PackedBuffer::new(&self.materials)
    }

    pub fn light_buffer(&self) -> PackedBuffer<'_> {
        PackedBuffer::new(&self.lights)
    }

    pub fn medium_buffer(&self) -> PackedBuffer<'_> {
        PackedBuffer::new(&self.media)
    }

    /// Named views of every buffer, in binding order.
    pub fn buffers(&self) -> [(&'static str, PackedBuffer<'_>); 6] {
        [
            ("bvh", self.node_buffer()),
            ("vertex", self.vertex_buffer()),
            ("triangle", self.triangle_buffer()),
            ("material", self.material_buffer()),
            ("light", self.light_buffer()),
            ("medium", self.medium_buffer()),
        ]
    }

    pub fn total_bytes(&self) -> usize {
        self.buffers().iter().map(|(_, b)| b.bytes.len()).sum()
    }
}

/// Convert the node array to shader records, preserving order.
pub fn pack_nodes(nodes: &[BvhNode]) -> PackResult<Vec<GpuNode>> {
    nodes.iter().map(GpuNode::from_node).collect()
}
