//! Mesh loading for the scene: glTF files and procedural meshes.

use std::path::PathBuf;

use engine_core::{GeometricMesh, LoadError, MeshLoader, MeshSource};
use procgen::ProceduralLoader;
use renderer::GltfLoader;

/// Routes each [`MeshSource`] to the loader that understands it. Relative
/// file paths are resolved against `base_dir`.
#[derive(Debug, Default, Clone)]
pub struct SceneLoader {
    pub base_dir: Option<PathBuf>,
}

impl SceneLoader {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }
}

impl MeshLoader for SceneLoader {
    fn load(&self, source: &MeshSource) -> Result<GeometricMesh, LoadError> {
        match source {
            MeshSource::File(path) => {
                let path = match &self.base_dir {
                    Some(base) if path.is_relative() => base.join(path),
                    _ => path.clone(),
                };
                GltfLoader.load(&MeshSource::File(path))
            }
            MeshSource::Procedural(_) => ProceduralLoader.load(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::ProceduralMesh;

    #[test]
    fn procedural_sources_are_generated() {
        let mesh = SceneLoader::default()
            .load(&MeshSource::Procedural(ProceduralMesh::Craft { length: 10.0 }))
            .unwrap();
        assert!(mesh.vertex_count() > 0);
    }

    #[test]
    fn files_resolve_against_the_base_dir() {
        let loader = SceneLoader::new(Some(PathBuf::from("/nonexistent/assets")));
        match loader.load(&MeshSource::File("ship.glb".into())) {
            Err(LoadError::NotFound(path)) => {
                assert_eq!(path, PathBuf::from("/nonexistent/assets/ship.glb"))
            }
            other => panic!("unexpected {:?}", other.map(|m| m.vertex_count())),
        }
    }
}
