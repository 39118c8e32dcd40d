use std::collections::BTreeMap;
use std::fmt;

use log::info;

use crate::error::RenderError;
use crate::geometry::{GeometryCatalog, PrimitiveId, VertexLayout};
use crate::render::RenderDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub(crate) u32);

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesh#{}", self.0)
    }
}

/// A vertex buffer owned by a device, with its vertex count and layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle {
    pub id: MeshId,
    pub vertex_count: u32,
    pub layout: VertexLayout,
}

impl MeshHandle {
    pub fn new(id: MeshId, vertex_count: u32, layout: VertexLayout) -> Self {
        Self {
            id,
            vertex_count,
            layout,
        }
    }

    /// Derives the vertex count from the buffer size.
    pub fn from_byte_len(id: MeshId, byte_len: u64, layout: VertexLayout) -> Self {
        Self::new(id, (byte_len / layout.stride_bytes()) as u32, layout)
    }

    pub fn stride(&self) -> u64 {
        self.layout.stride_bytes()
    }
}

/// One uploaded mesh per primitive, looked up by [`PrimitiveId`].
#[derive(Debug, Default)]
pub struct SceneMeshes {
    meshes: BTreeMap<PrimitiveId, MeshHandle>,
}

impl SceneMeshes {
    /// Uploads every primitive of the catalog. On failure the meshes created
    /// so far are released before the error is returned.
    pub fn upload<D: RenderDevice + ?Sized>(
        device: &mut D,
        catalog: &GeometryCatalog,
    ) -> Result<Self, RenderError> {
        let mut uploaded = Self::default();
        for primitive in catalog.iter() {
            match device.create_mesh(primitive) {
                Ok(handle) => {
                    uploaded.meshes.insert(primitive.id(), handle);
                }
                Err(err) => {
                    uploaded.destroy(device);
                    return Err(err);
                }
            }
        }
        info!(
            "uploaded {} meshes ({} vertices)",
            uploaded.len(),
            uploaded.meshes.values().map(|mesh| mesh.vertex_count).sum::<u32>()
        );
        Ok(uploaded)
    }

    pub fn get(&self, id: PrimitiveId) -> Option<MeshHandle> {
        self.meshes.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn destroy<D: RenderDevice + ?Sized>(&mut self, device: &mut D) {
        for (_, mesh) in std::mem::take(&mut self.meshes) {
            device.destroy_mesh(mesh);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessDevice;

    #[test]
    fn vertex_count_is_bytes_over_stride() {
        let lit = MeshHandle::from_byte_len(MeshId(1), 3072 * 4, VertexLayout::PositionNormalUv);
        assert_eq!(lit.vertex_count, 384);
        assert_eq!(lit.stride(), 32);
        let marker = MeshHandle::from_byte_len(MeshId(2), 108 * 4, VertexLayout::Position);
        assert_eq!(marker.vertex_count, 36);
    }

    #[test]
    fn upload_and_destroy_every_primitive() {
        let catalog = GeometryCatalog::still_life();
        let mut device = HeadlessDevice::new(800, 600);
        let mut meshes = SceneMeshes::upload(&mut device, &catalog).unwrap();
        assert_eq!(meshes.len(), PrimitiveId::ALL.len());
        assert_eq!(device.live_meshes(), PrimitiveId::ALL.len());
        for id in PrimitiveId::ALL {
            let mesh = meshes.get(id).unwrap();
            assert_eq!(mesh.vertex_count, catalog.get(id).vertex_count());
            assert_eq!(mesh.layout, id.layout());
        }

        meshes.destroy(&mut device);
        assert!(meshes.is_empty());
        assert_eq!(device.live_meshes(), 0);
    }
}
