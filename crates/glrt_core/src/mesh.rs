//! Triangle mesh geometry for GLRT scenes.
//!
//! Meshes are loaded from disk into a flat vertex array plus a triangle index
//! list. Normals and tangent frames are synthesized when the file does not
//! provide them.

use std::path::Path;

use glrt_math::{Bounds, Vec3};
use thiserror::Error;

/// Errors that can occur during mesh loading.
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Failed to load OBJ file {path}: {source}")]
    Obj {
        path: String,
        #[source]
        source: tobj::LoadError,
    },

    #[error("Unsupported mesh file extension: {0}")]
    UnsupportedFormat(String),
}

pub type MeshResult<T> = Result<T, MeshError>;

/// A mesh vertex with its shading frame.
///
/// `uv` carries texture coordinates in x/y; z is always 0 so the vertex can
/// be uploaded as a run of RGB texels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec3,
    pub tangent: Vec3,
    pub binormal: Vec3,
}

impl Vertex {
    /// Create a vertex with only a position.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

/// A mesh consisting of vertices and triangle indices.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex data (one entry per unique position/normal/uv combination)
    pub vertices: Vec<Vertex>,

    /// Triangle indices (every 3 indices form a triangle)
    pub indices: Vec<u32>,

    /// Axis-aligned bounding box of all vertex positions
    pub bounds: Bounds,
}

impl Mesh {
    /// Create a new mesh from vertices and indices.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let bounds = Self::compute_bounds(&vertices);
        Self {
            vertices,
            indices,
            bounds,
        }
    }

    /// Load a mesh from disk, choosing the reader by file extension.
    pub fn load(path: impl AsRef<Path>) -> MeshResult<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "obj" => Self::load_obj(path),
            _ => Err(MeshError::UnsupportedFormat(format!(".{}", extension))),
        }
    }

    /// Load a Wavefront OBJ file. All models in the file are merged into one mesh.
    pub fn load_obj(path: impl AsRef<Path>) -> MeshResult<Self> {
        let path = path.as_ref();
        let (models, _materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                single_index: true,
                triangulate: true,
                ..Default::default()
            },
        )
        .map_err(|source| MeshError::Obj {
            path: path.display().to_string(),
            source,
        })?;

        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut has_normals = true;
        let mut has_uvs = true;

        for model in &models {
            let mesh = &model.mesh;
            let offset = vertices.len() as u32;
            let vertex_count = mesh.positions.len() / 3;

            let model_has_normals = mesh.normals.len() >= vertex_count * 3;
            let model_has_uvs = mesh.texcoords.len() >= vertex_count * 2;
            has_normals &= model_has_normals;
            has_uvs &= model_has_uvs;

            for i in 0..vertex_count {
                let mut vertex = Vertex::from_position(Vec3::new(
                    mesh.positions[i * 3],
                    mesh.positions[i * 3 + 1],
                    mesh.positions[i * 3 + 2],
                ));
                if model_has_normals {
                    vertex.normal = Vec3::new(
                        mesh.normals[i * 3],
                        mesh.normals[i * 3 + 1],
                        mesh.normals[i * 3 + 2],
                    );
                }
                if model_has_uvs {
                    vertex.uv = Vec3::new(mesh.texcoords[i * 2], mesh.texcoords[i * 2 + 1], 0.0);
                }
                vertices.push(vertex);
            }

            indices.extend(mesh.indices.iter().map(|i| offset + i));
        }

        let mut mesh = Self::new(vertices, indices);
        if !has_normals {
            log::debug!("{}: no normals in file, computing smooth normals", path.display());
            mesh.compute_normals();
        }
        if has_uvs && !mesh.vertices.is_empty() {
            mesh.compute_tangents();
        }

        log::debug!(
            "Loaded {}: {} vertices, {} triangles",
            path.display(),
            mesh.vertex_count(),
            mesh.triangle_count()
        );

        Ok(mesh)
    }

    /// Compute axis-aligned bounding box from vertex positions.
    fn compute_bounds(vertices: &[Vertex]) -> Bounds {
        let mut bounds = Bounds::EMPTY;
        for v in vertices {
            bounds.merge_point(v.position);
        }
        bounds
    }

    /// Iterate over triangles whose three indices are all in range.
    fn valid_faces(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let n = self.vertices.len();
        self.indices.chunks_exact(3).filter_map(move |face| {
            let f = [face[0] as usize, face[1] as usize, face[2] as usize];
            (f[0] < n && f[1] < n && f[2] < n).then_some(f)
        })
    }

    /// Compute smooth vertex normals by averaging unit face normals.
    ///
    /// Degenerate faces contribute nothing; vertices touched only by degenerate
    /// faces keep a zero normal.
    pub fn compute_normals(&mut self) {
        let faces: Vec<[usize; 3]> = self.valid_faces().collect();

        for v in &mut self.vertices {
            v.normal = Vec3::ZERO;
        }

        for [i0, i1, i2] in faces {
            let p0 = self.vertices[i0].position;
            let p1 = self.vertices[i1].position;
            let p2 = self.vertices[i2].position;

            let n = (p1 - p0).cross(p2 - p0);
            let len = n.length();
            if len != 0.0 {
                let n = n / len;
                self.vertices[i0].normal += n;
                self.vertices[i1].normal += n;
                self.vertices[i2].normal += n;
            }
        }

        for v in &mut self.vertices {
            let len = v.normal.length();
            if len > 0.0 {
                v.normal /= len;
            }
        }
    }

    /// Compute per-vertex tangents and binormals from texture coordinates.
    pub fn compute_tangents(&mut self) {
        let faces: Vec<[usize; 3]> = self.valid_faces().collect();

        for v in &mut self.vertices {
            v.tangent = Vec3::ZERO;
            v.binormal = Vec3::ZERO;
        }

        for [i0, i1, i2] in faces {
            let (v0, v1, v2) = (self.vertices[i0], self.vertices[i1], self.vertices[i2]);

            let dp1 = v1.position - v0.position;
            let dp2 = v2.position - v0.position;
            let duv1 = (v1.uv - v0.uv).truncate();
            let duv2 = (v2.uv - v0.uv).truncate();

            let det = duv1.x * duv2.y - duv1.y * duv2.x;
            if det == 0.0 {
                continue;
            }

            let tangent = ((-dp1 * duv2.y + dp2 * duv1.y) / det).normalize_or_zero();
            let binormal = ((-dp2 * duv1.x + dp1 * duv2.x) / det).normalize_or_zero();

            for i in [i0, i1, i2] {
                self.vertices[i].tangent += tangent;
                self.vertices[i].binormal += binormal;
            }
        }

        for v in &mut self.vertices {
            if v.tangent.length() > 0.0 && v.binormal.length() > 0.0 {
                v.tangent = v.tangent.normalize();
                v.binormal = v.binormal.normalize();
            }
        }
    }

    /// Vertex positions in vertex-index order.
    pub fn positions(&self) -> Vec<Vec3> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    /// Get the number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get the number of vertices in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }
}
