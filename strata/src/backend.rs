use std::fmt::Debug;

use bitflags::bitflags;

use crate::{
    commands::CommandContext,
    errors::{BackendError, Result},
    geometry::{BuildFlags, GeometryData},
    DeviceAddress,
};

/// The device side of structure building.
///
/// Implementors allocate memory, run command contexts to completion and answer
/// size queries. Nothing here is asynchronous: [`submit_and_wait`] returns once
/// the device has retired the work.
///
/// [`submit_and_wait`]: AccelerationBackend::submit_and_wait
pub trait AccelerationBackend: Sized {
    type Error: BackendError;
    type Buffer: Debug;
    type Structure: Copy + Eq + Debug;
    type QueryPool: Copy + Debug;

    /// Pure sizing query, nothing is allocated.
    fn build_sizes(
        &self,
        level: StructureLevel,
        flags: BuildFlags,
        geometry: &GeometryData<'_>,
        max_primitive_counts: &[u32],
    ) -> BuildSizes;

    fn alloc_buffer(
        &self,
        size: u64,
        usage: BufferUsage,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self::Error, Self::Buffer>;

    fn buffer_address(&self, buffer: &Self::Buffer) -> DeviceAddress;

    /// Copies `data` at the start of a host visible buffer.
    fn write_buffer(&self, buffer: &Self::Buffer, data: &[u8]) -> Result<Self::Error, ()>;

    /// # Safety
    /// No pending device work may still reference the buffer.
    unsafe fn free_buffer(&self, buffer: Self::Buffer);

    fn create_structure(
        &self,
        level: StructureLevel,
        buffer: &Self::Buffer,
        size: u64,
    ) -> Result<Self::Error, Self::Structure>;

    fn structure_address(&self, structure: Self::Structure) -> DeviceAddress;

    /// # Safety
    /// No pending device work may still reference the structure.
    unsafe fn destroy_structure(&self, structure: Self::Structure);

    fn create_compacted_size_queries(&self, count: u32) -> Result<Self::Error, Self::QueryPool>;

    /// Blocks until the `count` results starting at `first` are available.
    fn read_compacted_sizes(
        &self,
        pool: Self::QueryPool,
        first: u32,
        count: u32,
    ) -> Result<Self::Error, Vec<u64>>;

    /// # Safety
    /// No pending device work may still reference the pool.
    unsafe fn destroy_query_pool(&self, pool: Self::QueryPool);

    /// Records `commands` into a one time command buffer, submits it and blocks
    /// until it is retired.
    fn submit_and_wait(&self, commands: &CommandContext<'_, Self>) -> Result<Self::Error, ()>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StructureLevel {
    Bottom,
    Top,
}

/// Answer of [`AccelerationBackend::build_sizes`], in bytes.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct BuildSizes {
    pub structure_size: u64,
    pub build_scratch_size: u64,
    pub update_scratch_size: u64,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MemoryLocation {
    Gpu,
    CpuToGpu,
}

bitflags! {
    // To correspond to the vulkan equivalent and save some unnecessary translations.
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 0x1;
        const TRANSFER_DST = 0x2;
        const STORAGE_BUFFER = 0x20;
        const INDEX_BUFFER = 0x40;
        const VERTEX_BUFFER = 0x80;
        const SHADER_DEVICE_ADDRESS = 0x2_0000;
        const ACCELERATION_STRUCTURE_BUILD_INPUT = 0x8_0000;
        const ACCELERATION_STRUCTURE_STORAGE = 0x10_0000;
    }
}

impl BufferUsage {
    pub const STAGING: Self = Self::TRANSFER_SRC;

    pub const SCRATCH: Self =
        Self::from_bits_truncate(Self::STORAGE_BUFFER.bits() | Self::SHADER_DEVICE_ADDRESS.bits());

    pub const STRUCTURE_STORAGE: Self = Self::from_bits_truncate(
        Self::ACCELERATION_STRUCTURE_STORAGE.bits() | Self::SHADER_DEVICE_ADDRESS.bits(),
    );

    pub const BUILD_INPUT: Self = Self::from_bits_truncate(
        Self::TRANSFER_DST.bits()
            | Self::SHADER_DEVICE_ADDRESS.bits()
            | Self::ACCELERATION_STRUCTURE_BUILD_INPUT.bits(),
    );
}
