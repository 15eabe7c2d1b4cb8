use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::DeviceAddress;

bitflags! {
    // Same bits as VkBuildAccelerationStructureFlagBitsKHR.
    pub struct BuildFlags: u32 {
        const ALLOW_UPDATE = 0x1;
        const ALLOW_COMPACTION = 0x2;
        const PREFER_FAST_TRACE = 0x4;
        const PREFER_FAST_BUILD = 0x8;
        const LOW_MEMORY = 0x10;
        const MOTION = 0x20;
    }
}

impl Default for BuildFlags {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    // Same bits as VkGeometryFlagBitsKHR.
    pub struct GeometryFlags: u32 {
        const OPAQUE = 0x1;
        const NO_DUPLICATE_ANY_HIT_INVOCATION = 0x2;
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VertexFormat {
    /// vec3 position.
    R32G32B32Sfloat,
    /// vec4 position, `w` ignored by the builder.
    R32G32B32A32Sfloat,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IndexType {
    U16,
    U32,
    /// Non indexed triangle list.
    None,
}

impl IndexType {
    pub fn size(&self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
            Self::None => 0,
        }
    }
}

/// One triangle buffer as the builder reads it from device memory.
#[derive(Debug, Copy, Clone)]
pub struct TriangleGeometry {
    pub vertex_address: DeviceAddress,
    pub vertex_format: VertexFormat,
    pub vertex_stride: u64,
    /// Highest vertex index that can be addressed.
    pub max_vertex: u32,
    pub index_type: IndexType,
    pub index_address: DeviceAddress,
    /// Optional 3x4 row major transform applied before building.
    pub transform_address: Option<DeviceAddress>,
    pub flags: GeometryFlags,
}

impl TriangleGeometry {
    pub fn new(
        vertex_address: DeviceAddress,
        vertex_format: VertexFormat,
        vertex_stride: u64,
        max_vertex: u32,
    ) -> Self {
        Self {
            vertex_address,
            vertex_format,
            vertex_stride,
            max_vertex,
            index_type: IndexType::None,
            index_address: 0,
            transform_address: None,
            flags: GeometryFlags::OPAQUE,
        }
    }

    pub fn indexed(mut self, index_type: IndexType, index_address: DeviceAddress) -> Self {
        self.index_type = index_type;
        self.index_address = index_address;
        self
    }

    pub fn transform(mut self, transform_address: DeviceAddress) -> Self {
        self.transform_address = Some(transform_address);
        self
    }

    pub fn flags(mut self, flags: GeometryFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Which part of the geometry buffers a build consumes.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct BuildRange {
    pub primitive_count: u32,
    /// In bytes, into the index buffer (or vertex buffer when non indexed).
    pub primitive_offset: u32,
    pub first_vertex: u32,
    pub transform_offset: u32,
}

impl BuildRange {
    pub fn primitives(primitive_count: u32) -> Self {
        Self {
            primitive_count,
            ..Default::default()
        }
    }
}

/// Geometry handed to a size query or a build command.
#[derive(Debug, Copy, Clone)]
pub enum GeometryData<'a> {
    Triangles(&'a [TriangleGeometry]),
    Instances { address: DeviceAddress },
}

/// Everything needed to build one BLAS.
///
/// Only device addresses are stored: the buffers they point to must stay alive and
/// untouched until the build call returns.
#[derive(Debug, Clone, Default)]
pub struct GeometryInput {
    geometries: Vec<TriangleGeometry>,
    ranges: Vec<BuildRange>,
    pub flags: BuildFlags,
}

impl GeometryInput {
    pub fn new(flags: BuildFlags) -> Self {
        Self {
            flags,
            ..Default::default()
        }
    }

    pub fn with_geometry(mut self, geometry: TriangleGeometry, range: BuildRange) -> Self {
        self.push(geometry, range);
        self
    }

    /// # Panics
    /// If the range holds no primitive.
    pub fn push(&mut self, geometry: TriangleGeometry, range: BuildRange) {
        assert!(
            range.primitive_count > 0,
            "Geometry without any primitive can't be built"
        );
        self.geometries.push(geometry);
        self.ranges.push(range);
    }

    pub fn geometries(&self) -> &[TriangleGeometry] {
        &self.geometries
    }

    pub fn ranges(&self) -> &[BuildRange] {
        &self.ranges
    }

    pub fn max_primitive_counts(&self) -> Vec<u32> {
        self.ranges.iter().map(|r| r.primitive_count).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// One geometry per sub mesh, all sharing the mesh buffers.
    pub fn from_mesh(mesh: &Mesh, flags: BuildFlags) -> Self {
        assert!(mesh.vertex_count > 0, "Mesh without any vertex");

        let mut input = Self::new(flags);

        for sub_mesh in mesh.sub_meshes.iter() {
            let triangles = TriangleGeometry::new(
                mesh.vertex_address,
                mesh.vertex_format,
                mesh.vertex_stride,
                mesh.vertex_count - 1,
            )
            .indexed(mesh.index_type, mesh.index_address);

            let range = BuildRange {
                primitive_count: sub_mesh.primitive_count(),
                primitive_offset: sub_mesh.index_start * mesh.index_type.size(),
                first_vertex: sub_mesh.vert_start,
                transform_offset: 0,
            };

            input.push(triangles, range);
        }

        input.geometries.shrink_to_fit();
        input.ranges.shrink_to_fit();
        input
    }
}

pub trait MeshVertex {
    fn format() -> VertexFormat;
    fn stride() -> u64;
}

#[derive(Debug, Copy, Clone, Pod, Zeroable)]
#[repr(C)]
pub struct VertexPosNormUvF32 {
    pub pos: [f32; 3],
    pub norm: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex for VertexPosNormUvF32 {
    fn format() -> VertexFormat {
        VertexFormat::R32G32B32Sfloat
    }

    fn stride() -> u64 {
        std::mem::size_of::<VertexPosNormUvF32>() as _
    }
}

pub trait MeshIndex {
    fn index_type() -> IndexType;
}

impl MeshIndex for u16 {
    fn index_type() -> IndexType {
        IndexType::U16
    }
}

impl MeshIndex for u32 {
    fn index_type() -> IndexType {
        IndexType::U32
    }
}

/// Indexed mesh living in device memory, as produced by the model loader.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub(crate) vertex_address: DeviceAddress,
    pub(crate) vertex_format: VertexFormat,
    pub(crate) vertex_stride: u64,
    pub(crate) vertex_count: u32,
    pub(crate) index_address: DeviceAddress,
    pub(crate) index_type: IndexType,
    pub(crate) sub_meshes: Box<[SubMesh]>,
}

/// Slice of a [`Mesh`]. Indices are relative to `vert_start`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SubMesh {
    pub vert_start: u32,
    pub vert_count: u32,
    pub index_start: u32,
    pub index_count: u32,
}

impl SubMesh {
    pub fn primitive_count(&self) -> u32 {
        self.index_count / 3
    }
}

impl From<(u32, u32, u32, u32)> for SubMesh {
    fn from((vert_start, vert_count, index_start, index_count): (u32, u32, u32, u32)) -> Self {
        Self {
            vert_start,
            vert_count,
            index_start,
            index_count,
        }
    }
}

impl Mesh {
    pub fn new<V: MeshVertex, I: MeshIndex>(
        vertex_address: DeviceAddress,
        vertex_count: u32,
        index_address: DeviceAddress,
        sub_meshes: impl IntoIterator<Item = impl Into<SubMesh>>,
    ) -> Self {
        Self {
            vertex_address,
            vertex_format: V::format(),
            vertex_stride: V::stride(),
            vertex_count,
            index_address,
            index_type: I::index_type(),
            sub_meshes: sub_meshes.into_iter().map(Into::into).collect(),
        }
    }

    /// The whole index buffer as a single sub mesh.
    pub fn single<V: MeshVertex, I: MeshIndex>(
        vertex_address: DeviceAddress,
        vertex_count: u32,
        index_address: DeviceAddress,
        index_count: u32,
    ) -> Self {
        Self::new::<V, I>(
            vertex_address,
            vertex_count,
            index_address,
            [SubMesh {
                vert_start: 0,
                vert_count: vertex_count,
                index_start: 0,
                index_count,
            }],
        )
    }

    pub fn sub_meshes(&self) -> &[SubMesh] {
        &self.sub_meshes
    }
}
