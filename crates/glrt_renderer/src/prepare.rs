//! One-shot scene setup: hierarchy construction followed by buffer packing.

use glrt_core::Scene;
use thiserror::Error;

use crate::bvh::{Bvh, BvhConfig, BvhError};
use crate::gpu::{PackError, SceneBuffers};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrepareError {
    #[error("BVH construction failed: {0}")]
    Bvh(#[from] BvhError),

    #[error("GPU packing failed: {0}")]
    Pack(#[from] PackError),
}

pub type PrepareResult<T> = Result<T, PrepareError>;

/// A scene's hierarchy together with its shader-ready buffers.
#[derive(Debug, Clone)]
pub struct PreparedScene {
    pub bvh: Bvh,
    pub buffers: SceneBuffers,
}

impl PreparedScene {
    pub fn node_count(&self) -> usize {
        self.bvh.len()
    }
}

/// Build the BVH over every scene triangle and pack all arrays for upload.
pub fn prepare(scene: &Scene, config: &BvhConfig) -> PrepareResult<PreparedScene> {
    let bvh = Bvh::with_config(&scene.positions(), &scene.indices(), config.clone())?;
    let buffers = SceneBuffers::pack(scene, &bvh)?;

    log::info!("Scene setup OK!");
    log::info!("#vertex: {}", scene.vertex_count());
    log::info!("#triangle: {}", scene.triangle_count());
    log::info!("#BVH node: {}", bvh.len());
    log::debug!(
        "BVH depth {}, {} lights, {} materials, {} media, {} buffer bytes",
        bvh.depth(),
        scene.light_count(),
        scene.material_count(),
        scene.media.len(),
        buffers.total_bytes()
    );

    Ok(PreparedScene { bvh, buffers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glrt_core::{Material, Mesh, Vertex};
    use glrt_math::Vec3;

    fn quad_scene() -> Scene {
        let mut scene = Scene::new("quad");
        scene.width = 64;
        scene.height = 32;
        let mat = scene.add_material(Material::diffuse(Vec3::ONE)).unwrap();
        let quad = Mesh::new(
            vec![
                Vertex::from_position(Vec3::new(0.0, 0.0, 0.0)),
                Vertex::from_position(Vec3::new(1.0, 0.0, 0.0)),
                Vertex::from_position(Vec3::new(1.0, 1.0, 0.0)),
                Vertex::from_position(Vec3::new(0.0, 1.0, 0.0)),
            ],
            vec![0, 1, 2, 0, 2, 3],
        );
        scene.add_mesh(&quad, mat).unwrap();
        scene
    }

    #[test]
    fn test_prepare_quad() {
        let _ = env_logger::builder().is_test(true).try_init();

        let scene = quad_scene();
        let prepared = prepare(&scene, &BvhConfig::default()).unwrap();

        assert_eq!(prepared.node_count(), 3);
        assert_eq!(prepared.buffers.nodes.len(), 3);
        assert_eq!(prepared.buffers.vertices.len(), 4);
        assert_eq!(prepared.buffers.triangles.len(), 2);
        assert!(prepared.buffers.lights.is_empty());

        let mut leaves = prepared.bvh.leaf_triangles();
        leaves.sort_unstable();
        assert_eq!(leaves, vec![0, 1]);
    }

    #[test]
    fn test_prepare_empty_scene() {
        let prepared = prepare(&Scene::new("empty"), &BvhConfig::default()).unwrap();
        assert!(prepared.bvh.is_empty());
        assert_eq!(prepared.buffers.total_bytes(), 0);
    }

    #[test]
    fn test_prepare_rejects_bad_config() {
        let config = BvhConfig {
            bucket_count: 0,
            ..Default::default()
        };
        let err = prepare(&quad_scene(), &config).unwrap_err();
        assert!(matches!(err, PrepareError::Bvh(BvhError::InvalidConfig(_))));
    }
}
