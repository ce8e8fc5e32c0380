//! Scene aggregate for GLRT.
//!
//! A scene is described by a JSON file naming the film size, a camera and a
//! list of shapes. Loading flattens every shape into shared vertex, triangle,
//! material and light arrays, which is the layout the GPU stage consumes.

use std::fs;
use std::path::{Path, PathBuf};

use glrt_math::{Camera, Vec3};
use serde::Deserialize;
use thiserror::Error;

use crate::mesh::{Mesh, MeshError, Vertex};
use crate::volume::{Volume, VolumeError};

/// Errors that can occur while loading a scene.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Failed to open file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse scene JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported camera type: {0}")]
    UnsupportedCamera(String),

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error("Failed to load volume {path}: {source}")]
    Volume {
        path: String,
        #[source]
        source: VolumeError,
    },

    #[error("Scene exceeds 32-bit index range: {0}")]
    TooLarge(String),

    #[error("Mesh index {index} is out of range for {vertex_count} vertices")]
    InvalidMesh { index: u32, vertex_count: usize },
}

pub type SceneResult<T> = Result<T, SceneError>;

// ---------------------------------------------------------------------------
// JSON description
// ---------------------------------------------------------------------------

/// Top-level layout of a scene file.
#[derive(Debug, Clone, Deserialize)]
pub struct SceneDescription {
    pub film: FilmDescription,
    pub camera: CameraDescription,
    #[serde(default)]
    pub scene: Vec<ShapeDescription>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FilmDescription {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraDescription {
    #[serde(rename = "type")]
    pub kind: String,
    pub look_at: LookAtDescription,
    pub fov: f32,
    pub near_clip: f32,
    pub far_clip: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LookAtDescription {
    pub origin: [f32; 3],
    pub target: [f32; 3],
    pub up: [f32; 3],
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShapeDescription {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(flatten)]
    pub material: MaterialDescription,
}

/// Surface description, tagged by the shape's `"material"` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "material", rename_all = "lowercase")]
pub enum MaterialDescription {
    Diffuse { reflectance: [f32; 3] },
    Emitter { emission: [f32; 3] },
    Volume { volume: MediumDescription },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediumDescription {
    pub density: String,
    pub temperature: String,
    pub bbox_min: [f32; 3],
    pub bbox_max: [f32; 3],
}

// ---------------------------------------------------------------------------
// Flattened scene
// ---------------------------------------------------------------------------

/// One triangle of the flattened scene: three vertex indices and a material id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Triangle {
    pub indices: [u32; 3],
    pub material: u32,
}

/// Surface response of a shape.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Material {
    /// Emitted radiance (zero for non-emitters)
    pub emission: Vec3,

    /// Diffuse reflectance
    pub reflectance: Vec3,

    /// Index into `Scene::media` for volumetric shapes
    pub medium: Option<u32>,
}

impl Material {
    pub fn diffuse(reflectance: Vec3) -> Self {
        Self {
            reflectance,
            ..Default::default()
        }
    }

    pub fn emitter(emission: Vec3) -> Self {
        Self {
            emission,
            ..Default::default()
        }
    }

    /// Check if this material is emissive.
    pub fn is_emissive(&self) -> bool {
        self.emission.length() != 0.0
    }
}

/// A heterogeneous participating medium bounded by a box.
#[derive(Clone, Debug)]
pub struct Medium {
    pub density: Volume,
    pub temperature: Volume,
    pub bbox_min: Vec3,
    pub bbox_max: Vec3,
}

/// A complete, flattened scene.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    /// Scene name (usually from filename)
    pub name: String,

    pub width: u32,
    pub height: u32,
    pub camera: Camera,

    /// All mesh vertices, concatenated in shape order
    pub vertices: Vec<Vertex>,

    /// All triangles, indexing into `vertices`
    pub triangles: Vec<Triangle>,

    /// Triangles whose material emits light (copies of entries in `triangles`)
    pub lights: Vec<Triangle>,

    /// One material per shape, in shape order
    pub materials: Vec<Material>,

    pub media: Vec<Medium>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Load a scene file. Relative mesh and volume paths are resolved against
    /// the scene file's directory.
    pub fn load(path: impl AsRef<Path>) -> SceneResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut scene = Self::from_json_str(&text, &base_dir)?;
        if let Some(stem) = path.file_stem() {
            scene.name = stem.to_string_lossy().into_owned();
        }
        Ok(scene)
    }

    /// Parse scene JSON text.
    pub fn from_json_str(text: &str, base_dir: &Path) -> SceneResult<Self> {
        let desc: SceneDescription = serde_json::from_str(text)?;
        Self::from_description(&desc, base_dir)
    }

    /// Build a scene from an already-parsed description.
    pub fn from_description(desc: &SceneDescription, base_dir: &Path) -> SceneResult<Self> {
        let mut scene = Self::new("");
        scene.width = desc.film.width;
        scene.height = desc.film.height;
        log::info!("Film: {} x {}", scene.width, scene.height);

        log::info!("Camera type: {}", desc.camera.kind);
        scene.camera = Self::camera_from(&desc.camera, scene.width, scene.height)?;

        for shape in &desc.scene {
            let material = match &shape.material {
                MaterialDescription::Diffuse { reflectance } => {
                    Material::diffuse(Vec3::from_array(*reflectance))
                }
                MaterialDescription::Emitter { emission } => {
                    Material::emitter(Vec3::from_array(*emission))
                }
                MaterialDescription::Volume { volume } => {
                    let medium = Self::load_medium(volume, base_dir)?;
                    let id = scene.add_medium(medium)?;
                    Material {
                        medium: Some(id),
                        ..Default::default()
                    }
                }
            };
            let material_id = scene.add_material(material)?;

            match (shape.kind.as_str(), &shape.filename) {
                ("obj", Some(filename)) => {
                    let mesh = Mesh::load(base_dir.join(filename))?;
                    scene.add_mesh(&mesh, material_id)?;
                }
                ("obj", None) => {
                    log::warn!("Shape of type \"obj\" has no filename, skipping geometry");
                }
                (other, _) => {
                    log::warn!("Unsupported shape type \"{}\", skipping geometry", other);
                }
            }
        }

        log::debug!("#vertex: {}", scene.vertex_count());
        log::debug!("#triangle: {}", scene.triangle_count());
        Ok(scene)
    }

    fn camera_from(desc: &CameraDescription, width: u32, height: u32) -> SceneResult<Camera> {
        if desc.kind != "perspective" {
            return Err(SceneError::UnsupportedCamera(desc.kind.clone()));
        }

        let aspect = if height > 0 {
            width as f32 / height as f32
        } else {
            1.0
        };

        Ok(Camera::look_at(
            Vec3::from_array(desc.look_at.origin),
            Vec3::from_array(desc.look_at.target),
            Vec3::from_array(desc.look_at.up),
            desc.fov,
            aspect,
            desc.near_clip,
            desc.far_clip,
        ))
    }

    fn load_medium(desc: &MediumDescription, base_dir: &Path) -> SceneResult<Medium> {
        let load = |name: &str| {
            let path = base_dir.join(name);
            Volume::load(&path).map_err(|source| SceneError::Volume {
                path: path.display().to_string(),
                source,
            })
        };

        Ok(Medium {
            density: load(&desc.density)?,
            temperature: load(&desc.temperature)?,
            bbox_min: Vec3::from_array(desc.bbox_min),
            bbox_max: Vec3::from_array(desc.bbox_max),
        })
    }

    /// Add a material and return its id.
    pub fn add_material(&mut self, material: Material) -> SceneResult<u32> {
        let id = to_u32(self.materials.len(), "material count")?;
        self.materials.push(material);
        Ok(id)
    }

    /// Add a medium and return its id.
    pub fn add_medium(&mut self, medium: Medium) -> SceneResult<u32> {
        let id = to_u32(self.media.len(), "medium count")?;
        self.media.push(medium);
        Ok(id)
    }

    /// Append a mesh, assigning every triangle to `material`.
    ///
    /// Triangles of an emissive material are also recorded as lights.
    pub fn add_mesh(&mut self, mesh: &Mesh, material: u32) -> SceneResult<()> {
        let base = to_u32(self.vertices.len(), "vertex count")?;
        to_u32(self.vertices.len() + mesh.vertices.len(), "vertex count")?;

        // Offsetting an out-of-range index could land inside another mesh.
        if let Some(&index) = mesh
            .indices
            .iter()
            .find(|&&i| i as usize >= mesh.vertices.len())
        {
            return Err(SceneError::InvalidMesh {
                index,
                vertex_count: mesh.vertices.len(),
            });
        }

        let emissive = self
            .materials
            .get(material as usize)
            .is_some_and(Material::is_emissive);

        self.vertices.extend_from_slice(&mesh.vertices);
        for face in mesh.indices.chunks_exact(3) {
            let tri = Triangle {
                indices: [base + face[0], base + face[1], base + face[2]],
                material,
            };
            self.triangles.push(tri);
            if emissive {
                self.lights.push(tri);
            }
        }
        Ok(())
    }

    /// Vertex positions in vertex-index order.
    pub fn positions(&self) -> Vec<Vec3> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    /// Flat triangle index list (three entries per triangle).
    pub fn indices(&self) -> Vec<u32> {
        self.triangles.iter().flat_map(|t| t.indices).collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }
}

fn to_u32(n: usize, what: &str) -> SceneResult<u32> {
    u32::try_from(n).map_err(|_| SceneError::TooLarge(format!("{} = {}", what, n)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRI_OBJ: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
    const QUAD_OBJ: &str = "v 0 2 0\nv 1 2 0\nv 1 2 1\nv 0 2 1\nf 1 2 3\nf 1 3 4\n";

    fn write_fixture(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    fn scene_json(shapes: &str) -> String {
        format!(
            r#"{{
                "film": {{ "width": 640, "height": 480 }},
                "camera": {{
                    "type": "perspective",
                    "lookAt": {{ "origin": [0, 1, 5], "target": [0, 1, 0], "up": [0, 1, 0] }},
                    "fov": 45.0, "nearClip": 0.1, "farClip": 100.0
                }},
                "scene": [{}]
            }}"#,
            shapes
        )
    }

    #[test]
    fn test_empty_scene() {
        let scene = Scene::from_json_str(&scene_json(""), Path::new(".")).unwrap();

        assert_eq!(scene.width, 640);
        assert_eq!(scene.height, 480);
        assert_eq!(scene.triangle_count(), 0);
        assert!(scene.indices().is_empty());
        assert!((scene.camera.aspect - 640.0 / 480.0).abs() < 1e-6);
        assert_eq!(scene.camera.position, Vec3::new(0.0, 1.0, 5.0));
    }

    #[test]
    fn test_load_shapes_and_lights() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "tri.obj", TRI_OBJ);
        write_fixture(dir.path(), "light.obj", QUAD_OBJ);

        let json = scene_json(
            r#"
            { "type": "obj", "filename": "tri.obj", "material": "diffuse", "reflectance": [0.5, 0.5, 0.5] },
            { "type": "obj", "filename": "light.obj", "material": "emitter", "emission": [10, 10, 10] }
            "#,
        );
        let path = dir.path().join("cornell.json");
        fs::write(&path, json).unwrap();

        let scene = Scene::load(&path).unwrap();

        assert_eq!(scene.name, "cornell");
        assert_eq!(scene.vertex_count(), 7);
        assert_eq!(scene.triangle_count(), 3);
        assert_eq!(scene.material_count(), 2);
        assert_eq!(scene.light_count(), 2);

        // Second mesh indices are offset by the first mesh's vertex count
        assert_eq!(scene.triangles[0].material, 0);
        assert_eq!(scene.triangles[1].indices, [3, 4, 5]);
        assert_eq!(scene.triangles[1].material, 1);
        assert_eq!(scene.lights[0], scene.triangles[1]);

        assert_eq!(scene.indices(), vec![0, 1, 2, 3, 4, 5, 3, 5, 6]);
        assert_eq!(scene.positions().len(), 7);
    }

    #[test]
    fn test_volume_material_loads_medium() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "box.obj", TRI_OBJ);
        let mut density = Volume::new(2, 2, 2, 1);
        density.set(1, 1, 1, 0, 4.0);
        density.save(dir.path().join("density.vol")).unwrap();
        Volume::new(2, 2, 2, 1).save(dir.path().join("temp.vol")).unwrap();

        let json = scene_json(
            r#"
            { "type": "obj", "filename": "box.obj", "material": "volume",
              "volume": { "density": "density.vol", "temperature": "temp.vol",
                          "bboxMin": [-1, -1, -1], "bboxMax": [1, 1, 1] } }
            "#,
        );
        let scene = Scene::from_json_str(&json, dir.path()).unwrap();

        assert_eq!(scene.media.len(), 1);
        assert_eq!(scene.materials[0].medium, Some(0));
        assert_eq!(scene.media[0].density.max_value, 4.0);
        assert_eq!(scene.media[0].bbox_max, Vec3::ONE);
        assert_eq!(scene.triangle_count(), 1);
    }

    #[test]
    fn test_unknown_material_is_parse_error() {
        let json = scene_json(r#"{ "type": "obj", "filename": "a.obj", "material": "glossy" }"#);
        let err = Scene::from_json_str(&json, Path::new(".")).unwrap_err();
        assert!(matches!(err, SceneError::Json(_)));
    }

    #[test]
    fn test_unknown_shape_type_keeps_material() {
        let json = scene_json(
            r#"{ "type": "sphere", "material": "diffuse", "reflectance": [1, 0, 0] }"#,
        );
        let scene = Scene::from_json_str(&json, Path::new(".")).unwrap();

        assert_eq!(scene.material_count(), 1);
        assert_eq!(scene.triangle_count(), 0);
    }

    #[test]
    fn test_unsupported_camera() {
        let json = scene_json("").replace("perspective", "orthographic");
        let err = Scene::from_json_str(&json, Path::new(".")).unwrap_err();
        assert!(matches!(err, SceneError::UnsupportedCamera(kind) if kind == "orthographic"));
    }

    #[test]
    fn test_missing_mesh_file() {
        let dir = tempfile::tempdir().unwrap();
        let json = scene_json(
            r#"{ "type": "obj", "filename": "missing.obj", "material": "diffuse", "reflectance": [1, 1, 1] }"#,
        );
        let err = Scene::from_json_str(&json, dir.path()).unwrap_err();
        assert!(matches!(err, SceneError::Mesh(MeshError::Obj { .. })));
    }

    #[test]
    fn test_add_mesh_rejects_out_of_range_index() {
        let tri = |indices: Vec<u32>| {
            Mesh::new(
                vec![
                    Vertex::from_position(Vec3::ZERO),
                    Vertex::from_position(Vec3::X),
                    Vertex::from_position(Vec3::Y),
                ],
                indices,
            )
        };

        let mut scene = Scene::new("bad");
        let mat = scene.add_material(Material::diffuse(Vec3::ONE)).unwrap();
        scene.add_mesh(&tri(vec![0, 1, 2]), mat).unwrap();

        let err = scene
            .add_mesh(&tri(vec![0, 1, u32::MAX - 1]), mat)
            .unwrap_err();
        assert!(matches!(
            err,
            SceneError::InvalidMesh {
                index,
                vertex_count: 3
            } if index == u32::MAX - 1
        ));

        let err = scene.add_mesh(&tri(vec![0, 1, 3]), mat).unwrap_err();
        assert!(matches!(err, SceneError::InvalidMesh { index: 3, .. }));

        assert_eq!(scene.vertex_count(), 3);
        assert_eq!(scene.indices(), vec![0, 1, 2]);
    }

    #[test]
    fn test_missing_scene_file() {
        let err = Scene::load("/nonexistent/scene.json").unwrap_err();
        assert!(matches!(err, SceneError::Io { .. }));
    }
}
