//! Software device used by the integration tests.
//!
//! Buffers are plain byte vectors at fake device addresses, builds read their
//! geometry back from them, and every missing barrier is recorded as a hazard.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use glam::{Affine3A, Vec3};
use parking_lot::Mutex;
use thiserror::Error;

use strata::{
    errors::{BackendError, Result},
    AccelerationBackend, Barrier, BufferUsage, BuildCommand, BuildFlags, BuildMode, BuildRange,
    BuildSizes, Command, CommandContext, DeviceAddress, GeometryData, IndexType, Instance,
    MemoryLocation, Mesh, StructureLevel, TransformMatrix, TriangleGeometry, VertexPosNormUvF32,
};

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Error, Debug)]
pub enum MockError {
    #[error("Out of device memory")]
    OutOfDeviceMemory,
    #[error("Query {0} read before being written")]
    QueryNotReady(u32),
}

impl BackendError for MockError {}

#[derive(Debug)]
pub struct MockBuffer {
    id: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct MockStructure(u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct MockQueryPool(u32);

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Hit {
    pub custom_index: u32,
    pub t: f32,
}

/// BLAS sizes built by one submission.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub blas_built: Vec<u64>,
    pub commands: usize,
}

#[derive(Debug, Copy, Clone)]
struct SizeModel {
    base: u64,
    per_primitive: u64,
}

impl SizeModel {
    fn sizes(&self, primitive_count: u32) -> BuildSizes {
        let count = primitive_count as u64;
        BuildSizes {
            structure_size: self.base + self.per_primitive * count,
            build_scratch_size: 128 + 16 * count,
            update_scratch_size: 64 + 8 * count,
        }
    }

    fn compacted(&self, size: u64) -> u64 {
        size / 2
    }
}

struct FakeBuffer {
    address: DeviceAddress,
    usage: BufferUsage,
    location: MemoryLocation,
    data: Vec<u8>,
    name: String,
}

#[derive(Clone)]
enum Content {
    Empty,
    Triangles(Vec<[Vec3; 3]>),
    Instances(Vec<Instance>),
}

impl Content {
    fn primitive_count(&self) -> usize {
        match self {
            Content::Empty => 0,
            Content::Triangles(triangles) => triangles.len(),
            Content::Instances(instances) => instances.len(),
        }
    }
}

struct FakeStructure {
    level: StructureLevel,
    size: u64,
    buffer: u32,
    address: DeviceAddress,
    flags: BuildFlags,
    content: Content,
    corrupt: bool,
}

#[derive(Default)]
struct State {
    next_id: u32,
    next_address: DeviceAddress,
    buffers: HashMap<u32, FakeBuffer>,
    structures: HashMap<u32, FakeStructure>,
    pools: HashMap<u32, Vec<Option<u64>>>,
    submissions: Vec<Submission>,
    hazards: Vec<String>,
    tlas_created: usize,
    allocs_left: Option<usize>,
    short_compacted_reads: bool,
}

impl State {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn hazard(&mut self, hazard: String) {
        log::warn!("Hazard: {}", hazard);
        self.hazards.push(hazard);
    }

    fn alloc(&mut self, size: u64, usage: BufferUsage, location: MemoryLocation, name: &str) -> u32 {
        let id = self.next_id();
        let address = self.next_address;
        // Keep a gap so that overruns never land in the next buffer
        self.next_address += ((size + 0xff) & !0xff) + 0x100;

        self.buffers.insert(
            id,
            FakeBuffer {
                address,
                usage,
                location,
                data: vec![0; size as usize],
                name: name.to_owned(),
            },
        );
        id
    }

    fn read(&self, address: DeviceAddress, len: usize) -> Option<&[u8]> {
        self.buffers.values().find_map(|buffer| {
            let start = address.checked_sub(buffer.address)? as usize;
            buffer.data.get(start..start + len)
        })
    }

    fn remaining(&self, address: DeviceAddress) -> u64 {
        self.buffers
            .values()
            .find_map(|buffer| {
                let start = address.checked_sub(buffer.address)?;
                (start < buffer.data.len() as u64).then(|| buffer.data.len() as u64 - start)
            })
            .unwrap_or(0)
    }

    fn read_triangles(
        &self,
        geometry: &TriangleGeometry,
        range: &BuildRange,
    ) -> std::result::Result<Vec<[Vec3; 3]>, String> {
        let transform = match geometry.transform_address {
            Some(address) => {
                let bytes = self
                    .read(address + range.transform_offset as u64, 48)
                    .ok_or_else(|| format!("Transform at {:#x} is unmapped", address))?;
                Affine3A::from(bytemuck::pod_read_unaligned::<TransformMatrix>(bytes))
            }
            None => Affine3A::IDENTITY,
        };

        let mut triangles = Vec::with_capacity(range.primitive_count as usize);
        for primitive in 0..range.primitive_count {
            let mut triangle = [Vec3::ZERO; 3];

            for (k, corner) in triangle.iter_mut().enumerate() {
                let n = (primitive * 3 + k as u32) as u64;
                let (vertex, base) = match geometry.index_type {
                    IndexType::None => (
                        range.first_vertex as u64 + n,
                        geometry.vertex_address + range.primitive_offset as u64,
                    ),
                    index_type => {
                        let size = index_type.size() as usize;
                        let address =
                            geometry.index_address + range.primitive_offset as u64 + n * size as u64;
                        let bytes = self
                            .read(address, size)
                            .ok_or_else(|| format!("Index at {:#x} is unmapped", address))?;
                        let index = match index_type {
                            IndexType::U16 => bytemuck::pod_read_unaligned::<u16>(bytes) as u64,
                            _ => bytemuck::pod_read_unaligned::<u32>(bytes) as u64,
                        };
                        (range.first_vertex as u64 + index, geometry.vertex_address)
                    }
                };

                if vertex > geometry.max_vertex as u64 {
                    return Err(format!(
                        "Vertex {} above max vertex {}",
                        vertex, geometry.max_vertex
                    ));
                }

                let address = base + vertex * geometry.vertex_stride;
                let bytes = self
                    .read(address, 12)
                    .ok_or_else(|| format!("Vertex at {:#x} is unmapped", address))?;
                let position = bytemuck::pod_read_unaligned::<[f32; 3]>(bytes);
                *corner = transform.transform_point3(Vec3::from(position));
            }

            triangles.push(triangle);
        }

        Ok(triangles)
    }

    fn build(&mut self, model: SizeModel, build: &BuildCommand<'_, MockBackend>, mut corrupt: bool) -> u64 {
        let primitive_count = build.ranges.iter().map(|r| r.primitive_count).sum::<u32>();
        let required = model.sizes(primitive_count);

        let content = match build.geometry {
            GeometryData::Triangles(geometries) => {
                assert_eq!(geometries.len(), build.ranges.len(), "One range per geometry");
                let mut triangles = Vec::new();
                for (geometry, range) in geometries.iter().zip(build.ranges) {
                    match self.read_triangles(geometry, range) {
                        Ok(read) => triangles.extend(read),
                        Err(err) => {
                            self.hazard(err);
                            corrupt = true;
                        }
                    }
                }
                Content::Triangles(triangles)
            }
            GeometryData::Instances { address } => {
                let count = primitive_count as usize;
                let instances = match self.read(address, count * 64) {
                    Some(bytes) => bytes
                        .chunks_exact(64)
                        .map(bytemuck::pod_read_unaligned::<Instance>)
                        .collect::<Vec<_>>(),
                    None => {
                        self.hazard(format!("Instances at {:#x} are unmapped", address));
                        corrupt = true;
                        Vec::new()
                    }
                };

                let dangling = instances
                    .iter()
                    .filter(|i| {
                        !self.structures.values().any(|s| {
                            s.level == StructureLevel::Bottom && s.address == i.blas_address
                        })
                    })
                    .count();
                if dangling > 0 {
                    self.hazard(format!("{} instances point to no BLAS", dangling));
                }

                Content::Instances(instances)
            }
        };

        let scratch_needed = match build.mode {
            BuildMode::Build => required.build_scratch_size,
            BuildMode::Update => required.update_scratch_size,
        };
        if self.remaining(build.scratch) < scratch_needed {
            self.hazard(format!("Scratch at {:#x} is too small", build.scratch));
            corrupt = true;
        }

        if build.mode == BuildMode::Update {
            let src = build.src.expect("Update without a source structure");
            let src = &self.structures[&src.0];
            let allowed = src.flags.contains(BuildFlags::ALLOW_UPDATE);
            let same_count = src.content.primitive_count() == content.primitive_count();
            if !allowed || !same_count {
                self.hazard("Invalid refit".to_owned());
                corrupt = true;
            }
        }

        let dst_size = self.structures[&build.dst.0].size;
        if dst_size < required.structure_size {
            self.hazard(format!(
                "Structure of {} bytes can't hold {} primitives",
                dst_size, primitive_count
            ));
            corrupt = true;
        }

        let dst = self
            .structures
            .get_mut(&build.dst.0)
            .expect("Build into a destroyed structure");
        dst.content = content;
        dst.corrupt = corrupt;
        dst.flags = build.flags;
        dst.size
    }
}

pub struct MockBackend {
    model: SizeModel,
    state: Mutex<State>,
}

impl MockBackend {
    /// 1024 bytes per structure plus 64 per primitive.
    pub fn new() -> Self {
        Self::with_size_model(1024, 64)
    }

    pub fn with_size_model(base: u64, per_primitive: u64) -> Self {
        Self {
            model: SizeModel {
                base,
                per_primitive,
            },
            state: Mutex::new(State {
                next_address: 0x1_0000,
                ..Default::default()
            }),
        }
    }

    /// Uncompacted size of a structure over `primitive_count` primitives.
    pub fn structure_size(&self, primitive_count: u32) -> u64 {
        self.model.sizes(primitive_count).structure_size
    }

    pub fn compacted_size(&self, primitive_count: u32) -> u64 {
        self.model.compacted(self.structure_size(primitive_count))
    }

    /// The next `allocations` buffer allocations succeed, the ones after fail.
    pub fn fail_alloc_after(&self, allocations: usize) {
        self.state.lock().allocs_left = Some(allocations);
    }

    /// Compacted size reads return one result less than asked.
    pub fn short_compacted_reads(&self) {
        self.state.lock().short_compacted_reads = true;
    }

    /// Device buffer holding `data`, as a mesh loader would have left it.
    pub fn device_buffer(&self, data: &[u8], name: &str) -> MockBuffer {
        let mut state = self.state.lock();
        let id = state.alloc(
            data.len().max(1) as u64,
            BufferUsage::BUILD_INPUT | BufferUsage::VERTEX_BUFFER | BufferUsage::INDEX_BUFFER,
            MemoryLocation::Gpu,
            name,
        );
        state.buffers.get_mut(&id).unwrap().data[..data.len()].copy_from_slice(data);
        MockBuffer { id }
    }

    /// Overwrites the start of a buffer made by [`device_buffer`](Self::device_buffer).
    pub fn overwrite(&self, buffer: &MockBuffer, data: &[u8]) {
        self.state.lock().buffers.get_mut(&buffer.id).unwrap().data[..data.len()]
            .copy_from_slice(data);
    }

    /// Uploads an indexed mesh and describes it.
    pub fn triangle_mesh(&self, positions: &[Vec3], indices: &[u32]) -> (Mesh, [MockBuffer; 2]) {
        let vertices = positions
            .iter()
            .map(|p| VertexPosNormUvF32 {
                pos: p.to_array(),
                norm: [0.0, 0.0, 1.0],
                uv: [0.0, 0.0],
            })
            .collect::<Vec<_>>();

        let vertex_buffer = self.device_buffer(bytemuck::cast_slice(&vertices), "Vertices");
        let index_buffer = self.device_buffer(bytemuck::cast_slice(indices), "Indices");

        let mesh = Mesh::single::<VertexPosNormUvF32, u32>(
            self.buffer_address(&vertex_buffer),
            positions.len() as u32,
            self.buffer_address(&index_buffer),
            indices.len() as u32,
        );

        (mesh, [vertex_buffer, index_buffer])
    }

    pub fn vertex_bytes(positions: &[Vec3]) -> Vec<u8> {
        let vertices = positions
            .iter()
            .map(|p| VertexPosNormUvF32 {
                pos: p.to_array(),
                norm: [0.0, 0.0, 1.0],
                uv: [0.0, 0.0],
            })
            .collect::<Vec<_>>();
        bytemuck::cast_slice(&vertices).to_vec()
    }

    pub fn free_all(&self, buffers: impl IntoIterator<Item = MockBuffer>) {
        for buffer in buffers {
            unsafe { self.free_buffer(buffer) };
        }
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_structures(&self) -> usize {
        self.state.lock().structures.len()
    }

    pub fn live_query_pools(&self) -> usize {
        self.state.lock().pools.len()
    }

    pub fn tlas_created(&self) -> usize {
        self.state.lock().tlas_created
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    pub fn hazards(&self) -> Vec<String> {
        self.state.lock().hazards.clone()
    }

    pub fn structure_alive(&self, structure: MockStructure) -> bool {
        self.state.lock().structures.contains_key(&structure.0)
    }

    /// Triangles a BLAS was built over, in world space of the BLAS.
    pub fn blas_triangles(&self, blas: MockStructure) -> Vec<[Vec3; 3]> {
        match &self.state.lock().structures[&blas.0].content {
            Content::Triangles(triangles) => triangles.clone(),
            _ => panic!("Not a built BLAS"),
        }
    }

    /// Closest hit of a ray against the scene of `tlas`.
    pub fn trace(&self, tlas: MockStructure, origin: Vec3, dir: Vec3) -> Option<Hit> {
        let state = self.state.lock();
        let tlas = state
            .structures
            .get(&tlas.0)
            .expect("Tracing a destroyed TLAS");
        assert!(!tlas.corrupt, "Tracing a corrupted TLAS");

        let instances = match &tlas.content {
            Content::Instances(instances) => instances,
            _ => panic!("TLAS was never built"),
        };

        let mut best: Option<Hit> = None;
        for instance in instances {
            let blas = state
                .structures
                .values()
                .find(|s| s.level == StructureLevel::Bottom && s.address == instance.blas_address)
                .expect("Instance of a destroyed BLAS");
            assert!(!blas.corrupt, "Tracing a corrupted BLAS");

            let triangles = match &blas.content {
                Content::Triangles(triangles) => triangles,
                _ => panic!("BLAS was never built"),
            };

            let to_object = Affine3A::from(instance.transform).inverse();
            let o = to_object.transform_point3(origin);
            let d = to_object.transform_vector3(dir);

            for triangle in triangles {
                if let Some(t) = intersect(o, d, triangle) {
                    if best.map_or(true, |b| t < b.t) {
                        best = Some(Hit {
                            custom_index: instance.custom_index(),
                            t,
                        });
                    }
                }
            }
        }

        best
    }
}

/// Moller-Trumbore, `t` in units of `dir`.
fn intersect(origin: Vec3, dir: Vec3, triangle: &[Vec3; 3]) -> Option<f32> {
    let [a, b, c] = *triangle;
    let e1 = b - a;
    let e2 = c - a;

    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < 1e-8 {
        return None;
    }

    let inv = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(e1);
    let v = dir.dot(q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(q) * inv;
    (t > 1e-6).then(|| t)
}

impl AccelerationBackend for MockBackend {
    type Error = MockError;
    type Buffer = MockBuffer;
    type Structure = MockStructure;
    type QueryPool = MockQueryPool;

    fn build_sizes(
        &self,
        _level: StructureLevel,
        _flags: BuildFlags,
        _geometry: &GeometryData<'_>,
        max_primitive_counts: &[u32],
    ) -> BuildSizes {
        self.model.sizes(max_primitive_counts.iter().sum())
    }

    fn alloc_buffer(
        &self,
        size: u64,
        usage: BufferUsage,
        location: MemoryLocation,
        name: &str,
    ) -> Result<MockError, MockBuffer> {
        let mut state = self.state.lock();
        if let Some(left) = state.allocs_left.as_mut() {
            if *left == 0 {
                return Err(MockError::OutOfDeviceMemory.into());
            }
            *left -= 1;
        }

        assert!(size > 0, "Zero sized buffer '{}'", name);
        Ok(MockBuffer {
            id: state.alloc(size, usage, location, name),
        })
    }

    fn buffer_address(&self, buffer: &MockBuffer) -> DeviceAddress {
        let mut state = self.state.lock();
        let (address, usage) = {
            let buffer = &state.buffers[&buffer.id];
            (buffer.address, buffer.usage)
        };
        if !usage.contains(BufferUsage::SHADER_DEVICE_ADDRESS) {
            state.hazard("Address of a buffer without SHADER_DEVICE_ADDRESS".to_owned());
        }
        address
    }

    fn write_buffer(&self, buffer: &MockBuffer, data: &[u8]) -> Result<MockError, ()> {
        let mut state = self.state.lock();
        let location = state.buffers[&buffer.id].location;
        if location != MemoryLocation::CpuToGpu {
            state.hazard("Host write into device local memory".to_owned());
        }
        state.buffers.get_mut(&buffer.id).unwrap().data[..data.len()].copy_from_slice(data);
        Ok(())
    }

    unsafe fn free_buffer(&self, buffer: MockBuffer) {
        let mut state = self.state.lock();
        if state.structures.values().any(|s| s.buffer == buffer.id) {
            let name = state.buffers[&buffer.id].name.clone();
            state.hazard(format!("Buffer '{}' freed under a live structure", name));
        }
        state
            .buffers
            .remove(&buffer.id)
            .expect("Double free of a buffer");
    }

    fn create_structure(
        &self,
        level: StructureLevel,
        buffer: &MockBuffer,
        size: u64,
    ) -> Result<MockError, MockStructure> {
        let mut state = self.state.lock();
        let backing = &state.buffers[&buffer.id];
        assert!(
            backing
                .usage
                .contains(BufferUsage::ACCELERATION_STRUCTURE_STORAGE),
            "Structure in a buffer without ACCELERATION_STRUCTURE_STORAGE"
        );
        assert!(size <= backing.data.len() as u64, "Structure larger than its buffer");
        let address = backing.address;

        if level == StructureLevel::Top {
            state.tlas_created += 1;
        }

        let id = state.next_id();
        state.structures.insert(
            id,
            FakeStructure {
                level,
                size,
                buffer: buffer.id,
                address,
                flags: BuildFlags::empty(),
                content: Content::Empty,
                corrupt: false,
            },
        );
        Ok(MockStructure(id))
    }

    fn structure_address(&self, structure: MockStructure) -> DeviceAddress {
        self.state.lock().structures[&structure.0].address
    }

    unsafe fn destroy_structure(&self, structure: MockStructure) {
        self.state
            .lock()
            .structures
            .remove(&structure.0)
            .expect("Double destroy of a structure");
    }

    fn create_compacted_size_queries(&self, count: u32) -> Result<MockError, MockQueryPool> {
        let mut state = self.state.lock();
        let id = state.next_id();
        state.pools.insert(id, vec![None; count as usize]);
        Ok(MockQueryPool(id))
    }

    fn read_compacted_sizes(
        &self,
        pool: MockQueryPool,
        first: u32,
        count: u32,
    ) -> Result<MockError, Vec<u64>> {
        let state = self.state.lock();
        let slots = &state.pools[&pool.0][first as usize..(first + count) as usize];

        let mut sizes = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| slot.ok_or(MockError::QueryNotReady(first + i as u32)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if state.short_compacted_reads {
            sizes.pop();
        }
        Ok(sizes)
    }

    unsafe fn destroy_query_pool(&self, pool: MockQueryPool) {
        self.state
            .lock()
            .pools
            .remove(&pool.0)
            .expect("Double destroy of a query pool");
    }

    fn submit_and_wait(&self, commands: &CommandContext<'_, Self>) -> Result<MockError, ()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut submission = Submission {
            commands: commands.commands().len(),
            ..Default::default()
        };
        let mut pending_scratch = HashSet::new();
        let mut pending_builds = HashSet::new();
        let mut pending_uploads: Vec<(DeviceAddress, u64)> = Vec::new();

        for command in commands.commands() {
            match command {
                Command::Upload { staging, dst, size } => {
                    let data = state.buffers[&staging.id].data[..*size as usize].to_vec();
                    let dst = state
                        .buffers
                        .get_mut(&dst.id)
                        .expect("Upload into a freed buffer");
                    dst.data[..data.len()].copy_from_slice(&data);
                    pending_uploads.push((dst.address, *size));
                }
                Command::Barrier(Barrier::BuildToBuild) => {
                    pending_scratch.clear();
                    pending_builds.clear();
                }
                Command::Barrier(Barrier::TransferToBuild) => pending_uploads.clear(),
                Command::ResetQueries { pool, first, count } => {
                    let slots = state
                        .pools
                        .get_mut(&pool.0)
                        .expect("Reset of a destroyed query pool");
                    for slot in &mut slots[*first as usize..(*first + *count) as usize] {
                        *slot = None;
                    }
                }
                Command::Build(build) => {
                    let mut corrupt = false;

                    if !pending_scratch.insert(build.scratch) {
                        state.hazard(format!(
                            "Scratch {:#x} reused without a barrier",
                            build.scratch
                        ));
                        corrupt = true;
                    }

                    if let GeometryData::Instances { address } = build.geometry {
                        let racing = pending_uploads
                            .iter()
                            .any(|&(start, size)| address >= start && address < start + size);
                        if racing {
                            state.hazard("Instances read before the transfer barrier".to_owned());
                            corrupt = true;
                        }
                    }

                    let size = state.build(self.model, build, corrupt);
                    if build.level == StructureLevel::Bottom && build.mode == BuildMode::Build {
                        submission.blas_built.push(size);
                    }
                    pending_builds.insert(build.dst);
                }
                Command::WriteCompactedSize {
                    structure,
                    pool,
                    query,
                } => {
                    if pending_builds.contains(structure) {
                        state.hazard("Compacted size queried before the build barrier".to_owned());
                    }

                    let built = &state.structures[&structure.0];
                    let unbuilt = matches!(built.content, Content::Empty);
                    let compacted = self.model.compacted(built.size);
                    if unbuilt {
                        state.hazard("Compacted size of an unbuilt structure".to_owned());
                    }

                    state
                        .pools
                        .get_mut(&pool.0)
                        .expect("Query into a destroyed pool")[*query as usize] = Some(compacted);
                }
                Command::CopyCompact { src, dst } => {
                    let (content, corrupt, needed) = {
                        let src = &state.structures[&src.0];
                        (src.content.clone(), src.corrupt, self.model.compacted(src.size))
                    };

                    let dst_size = state.structures[&dst.0].size;
                    if dst_size < needed {
                        state.hazard("Compacted copy into a structure too small".to_owned());
                    }

                    let src_flags = state.structures[&src.0].flags;
                    let dst = state
                        .structures
                        .get_mut(&dst.0)
                        .expect("Copy into a destroyed structure");
                    dst.content = content;
                    dst.corrupt = corrupt || dst_size < needed;
                    dst.flags = src_flags;
                }
            }
        }

        log::debug!("Mock submission of {} commands", submission.commands);
        state.submissions.push(submission);
        Ok(())
    }
}

/// `count` triangles side by side along +X in the z = 0 plane, triangle `k` covering
/// `[k, k + 1] x [0, 1]` below its diagonal.
pub fn strip_positions(count: u32) -> Vec<Vec3> {
    (0..count)
        .flat_map(|k| {
            let origin = Vec3::new(k as f32, 0.0, 0.0);
            [origin, origin + Vec3::X, origin + Vec3::Y]
        })
        .collect()
}

pub fn strip(mock: &MockBackend, count: u32) -> (Mesh, [MockBuffer; 2]) {
    let positions = strip_positions(count);
    let indices = (0..positions.len() as u32).collect::<Vec<_>>();
    mock.triangle_mesh(&positions, &indices)
}

/// One strip per entry of `triangles`, and the buffers backing all of them.
pub fn strips(mock: &MockBackend, triangles: &[u32]) -> (Vec<Mesh>, Vec<MockBuffer>) {
    let mut meshes = Vec::new();
    let mut buffers = Vec::new();
    for &count in triangles {
        let (mesh, mesh_buffers) = strip(mock, count);
        meshes.push(mesh);
        buffers.extend(mesh_buffers);
    }
    (meshes, buffers)
}

/// A ray straight down onto the first triangle of a strip placed at `offset`.
pub fn ray_down_at(offset: Vec3) -> (Vec3, Vec3) {
    (offset + Vec3::new(0.25, 0.25, 1.0), Vec3::NEG_Z)
}
