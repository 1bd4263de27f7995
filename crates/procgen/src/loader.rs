//! [`MeshLoader`] for built-in procedural meshes.

use engine_core::{GeometricMesh, LoadError, MeshLoader, MeshSource, ProceduralMesh};

use crate::shapes::{craft_mesh, hull_mesh};
use crate::terrain::{TerrainConfig, TerrainData};

/// Builds [`MeshSource::Procedural`] meshes; file sources are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProceduralLoader;

impl ProceduralLoader {
    pub fn generate(kind: &ProceduralMesh) -> GeometricMesh {
        match kind {
            ProceduralMesh::Terrain {
                size,
                resolution,
                height_scale,
                seed,
            } => TerrainData::generate(TerrainConfig {
                size: *size,
                resolution: *resolution,
                height_scale: *height_scale,
                seed: *seed,
                ..Default::default()
            })
            .to_mesh(),
            ProceduralMesh::Craft { length } => craft_mesh(*length),
            ProceduralMesh::Hull { half_extents } => hull_mesh(*half_extents),
        }
    }
}

impl MeshLoader for ProceduralLoader {
    fn load(&self, source: &MeshSource) -> Result<GeometricMesh, LoadError> {
        match source {
            MeshSource::Procedural(kind) => {
                let mesh = Self::generate(kind);
                mesh.validate()?;
                log::info!(
                    "Generated {} ({} vertices, {} objects)",
                    source,
                    mesh.vertex_count(),
                    mesh.objects.len()
                );
                Ok(mesh)
            }
            MeshSource::File(path) => Err(LoadError::Unsupported(format!(
                "procedural loader cannot read {}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::Vec3;

    #[test]
    fn loads_every_procedural_kind() {
        let kinds = [
            ProceduralMesh::Terrain {
                size: 32.0,
                resolution: 5,
                height_scale: 4.0,
                seed: 1,
            },
            ProceduralMesh::Craft { length: 1.0 },
            ProceduralMesh::Hull {
                half_extents: Vec3::ONE,
            },
        ];
        for kind in kinds {
            let mesh = ProceduralLoader.load(&MeshSource::Procedural(kind)).unwrap();
            assert!(mesh.vertex_count() > 0);
        }
    }

    #[test]
    fn rejects_files() {
        let result = ProceduralLoader.load(&MeshSource::File("terrain.glb".into()));
        assert!(matches!(result, Err(LoadError::Unsupported(_))));
    }
}
