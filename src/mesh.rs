// Mesh data - vertex layout, deduplication, OBJ loading
//
// Vertices are deduplicated by bit-exact equality of every attribute, so
// the index buffer only ever references the first occurrence.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;
use std::path::Path;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

/// Bit pattern of a vertex, used as the dedup key (f32 is not Hash/Eq)
type VertexKey = [u32; 8];

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, tex_coord) as u32,
            },
        ]
    }

    fn key(&self) -> VertexKey {
        bytemuck::cast(*self)
    }
}

/// Compact vertex list plus indices into it
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Builds a [`MeshData`] one vertex reference at a time
#[derive(Default)]
pub struct MeshBuilder {
    mesh: MeshData,
    unique: HashMap<VertexKey, u32>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reference to `vertex`, returning the index it was given
    pub fn push(&mut self, vertex: Vertex) -> u32 {
        let next = self.mesh.vertices.len() as u32;
        let index = *self.unique.entry(vertex.key()).or_insert(next);
        if index == next {
            self.mesh.vertices.push(vertex);
        }
        self.mesh.indices.push(index);
        index
    }

    pub fn build(self) -> MeshData {
        self.mesh
    }
}

const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

/// Textured quad in the XY plane: 4 vertices, 2 triangles
pub fn quad() -> MeshData {
    let corners = [
        Vertex {
            pos: [-0.5, -0.5, 0.0],
            color: [1.0, 0.0, 0.0],
            tex_coord: [1.0, 0.0],
        },
        Vertex {
            pos: [0.5, -0.5, 0.0],
            color: [0.0, 1.0, 0.0],
            tex_coord: [0.0, 0.0],
        },
        Vertex {
            pos: [0.5, 0.5, 0.0],
            color: [0.0, 0.0, 1.0],
            tex_coord: [0.0, 1.0],
        },
        Vertex {
            pos: [-0.5, 0.5, 0.0],
            color: WHITE,
            tex_coord: [1.0, 1.0],
        },
    ];

    let mut builder = MeshBuilder::new();
    for i in [0, 1, 2, 2, 3, 0] {
        builder.push(corners[i]);
    }
    builder.build()
}

/// Load a triangulated OBJ, flipping V for top-left texture origin
pub fn load_obj(path: impl AsRef<Path>) -> Result<MeshData> {
    let path = path.as_ref();
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };

    let (models, _materials) = tobj::load_obj(path, &options)
        .with_context(|| format!("Failed to load model {:?}", path))?;

    let mut builder = MeshBuilder::new();
    for model in &models {
        let mesh = &model.mesh;
        anyhow::ensure!(
            !mesh.texcoords.is_empty(),
            "Model {:?} ({}) has no texture coordinates",
            path,
            model.name
        );

        for &index in &mesh.indices {
            let i = index as usize;
            builder.push(Vertex {
                pos: [
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                ],
                color: WHITE,
                tex_coord: [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]],
            });
        }
    }

    let mesh = builder.build();
    anyhow::ensure!(!mesh.indices.is_empty(), "Model {:?} has no faces", path);
    log::info!(
        "Loaded {:?}: {} vertices, {} indices",
        path,
        mesh.vertices.len(),
        mesh.indices.len()
    );
    Ok(mesh)
}
