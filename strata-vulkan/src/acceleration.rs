use ash::vk;
use log::trace;
use strata::{
    AccelerationBackend, BufferUsage, BuildCommand, BuildFlags, BuildMode, BuildSizes,
    CommandContext, DeviceAddress, GeometryData, GeometryFlags, IndexType, MemoryLocation,
    StructureLevel, TriangleGeometry, VertexFormat,
};

use crate::{
    alloc::VulkanBuffer,
    errors::{Result, VkErrorExt, VulkanError},
    VulkanBackend,
};

pub(crate) fn translate_level(level: StructureLevel) -> vk::AccelerationStructureTypeKHR {
    match level {
        StructureLevel::Bottom => vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
        StructureLevel::Top => vk::AccelerationStructureTypeKHR::TOP_LEVEL,
    }
}

pub(crate) fn translate_build_flags(flags: BuildFlags) -> vk::BuildAccelerationStructureFlagsKHR {
    vk::BuildAccelerationStructureFlagsKHR::from_raw(flags.bits())
}

pub(crate) fn translate_geometry_flags(flags: GeometryFlags) -> vk::GeometryFlagsKHR {
    vk::GeometryFlagsKHR::from_raw(flags.bits())
}

pub(crate) fn translate_vertex_format(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::R32G32B32Sfloat => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::R32G32B32A32Sfloat => vk::Format::R32G32B32A32_SFLOAT,
    }
}

pub(crate) fn translate_index_type(index_type: IndexType) -> vk::IndexType {
    match index_type {
        IndexType::U16 => vk::IndexType::UINT16,
        IndexType::U32 => vk::IndexType::UINT32,
        IndexType::None => vk::IndexType::NONE_KHR,
    }
}

fn device_address(address: DeviceAddress) -> vk::DeviceOrHostAddressConstKHR {
    vk::DeviceOrHostAddressConstKHR {
        device_address: address,
    }
}

fn translate_triangles(geometry: &TriangleGeometry) -> vk::AccelerationStructureGeometryKHR {
    let triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::builder()
        .vertex_format(translate_vertex_format(geometry.vertex_format))
        .vertex_stride(geometry.vertex_stride)
        .vertex_data(device_address(geometry.vertex_address))
        .max_vertex(geometry.max_vertex)
        .index_type(translate_index_type(geometry.index_type))
        .index_data(device_address(geometry.index_address))
        .transform_data(device_address(geometry.transform_address.unwrap_or(0)));

    vk::AccelerationStructureGeometryKHR::builder()
        .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
        .flags(translate_geometry_flags(geometry.flags))
        .geometry(vk::AccelerationStructureGeometryDataKHR {
            triangles: triangles.build(),
        })
        .build()
}

/// Vulkan geometry descriptions, built because nothing here is borrowed.
pub(crate) fn translate_geometry(
    geometry: &GeometryData<'_>,
) -> Vec<vk::AccelerationStructureGeometryKHR> {
    match geometry {
        GeometryData::Triangles(triangles) => triangles.iter().map(translate_triangles).collect(),
        GeometryData::Instances { address } => {
            let instances = vk::AccelerationStructureGeometryInstancesDataKHR::builder()
                .array_of_pointers(false)
                .data(device_address(*address));

            vec![vk::AccelerationStructureGeometryKHR::builder()
                .geometry_type(vk::GeometryTypeKHR::INSTANCES)
                .flags(vk::GeometryFlagsKHR::OPAQUE)
                .geometry(vk::AccelerationStructureGeometryDataKHR {
                    instances: instances.build(),
                })
                .build()]
        }
    }
}

/// Owns everything a `vkCmdBuildAccelerationStructuresKHR` call points to.
pub(crate) struct BuildInfo {
    ty: vk::AccelerationStructureTypeKHR,
    flags: vk::BuildAccelerationStructureFlagsKHR,
    mode: vk::BuildAccelerationStructureModeKHR,
    src: vk::AccelerationStructureKHR,
    dst: vk::AccelerationStructureKHR,
    scratch: DeviceAddress,
    geometries: Vec<vk::AccelerationStructureGeometryKHR>,
    pub(crate) ranges: Vec<vk::AccelerationStructureBuildRangeInfoKHR>,
}

impl BuildInfo {
    pub(crate) fn new(build: &BuildCommand<'_, VulkanBackend>) -> Self {
        let mode = match build.mode {
            BuildMode::Build => vk::BuildAccelerationStructureModeKHR::BUILD,
            BuildMode::Update => vk::BuildAccelerationStructureModeKHR::UPDATE,
        };

        let ranges = build
            .ranges
            .iter()
            .map(|range| {
                vk::AccelerationStructureBuildRangeInfoKHR::builder()
                    .primitive_count(range.primitive_count)
                    .primitive_offset(range.primitive_offset)
                    .first_vertex(range.first_vertex)
                    .transform_offset(range.transform_offset)
                    .build()
            })
            .collect();

        Self {
            ty: translate_level(build.level),
            flags: translate_build_flags(build.flags),
            mode,
            src: build.src.unwrap_or_default(),
            dst: build.dst,
            scratch: build.scratch,
            geometries: translate_geometry(&build.geometry),
            ranges,
        }
    }

    /// Points into `self`, which must outlive the returned struct.
    pub(crate) fn geometry_info(&self) -> vk::AccelerationStructureBuildGeometryInfoKHR {
        vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(self.ty)
            .flags(self.flags)
            .mode(self.mode)
            .src_acceleration_structure(self.src)
            .dst_acceleration_structure(self.dst)
            .geometries(&self.geometries)
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: self.scratch,
            })
            .build()
    }
}

impl AccelerationBackend for VulkanBackend {
    type Error = VulkanError;
    type Buffer = VulkanBuffer;
    type Structure = vk::AccelerationStructureKHR;
    type QueryPool = vk::QueryPool;

    fn build_sizes(
        &self,
        level: StructureLevel,
        flags: BuildFlags,
        geometry: &GeometryData<'_>,
        max_primitive_counts: &[u32],
    ) -> BuildSizes {
        let geometries = translate_geometry(geometry);
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(translate_level(level))
            .flags(translate_build_flags(flags))
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(&geometries);

        let sizes = unsafe {
            self.ext_acceleration_structure
                .get_acceleration_structure_build_sizes(
                    vk::AccelerationStructureBuildTypeKHR::DEVICE,
                    &build_info,
                    max_primitive_counts,
                )
        };

        BuildSizes {
            structure_size: sizes.acceleration_structure_size,
            build_scratch_size: sizes.build_scratch_size,
            update_scratch_size: sizes.update_scratch_size,
        }
    }

    fn alloc_buffer(
        &self,
        size: u64,
        usage: BufferUsage,
        location: MemoryLocation,
        name: &str,
    ) -> Result<VulkanBuffer> {
        self.create_buffer(size, usage, location, name)
    }

    fn buffer_address(&self, buffer: &VulkanBuffer) -> DeviceAddress {
        buffer.address
    }

    fn write_buffer(&self, buffer: &VulkanBuffer, data: &[u8]) -> Result<()> {
        self.store_to_buffer(buffer, data)
    }

    unsafe fn free_buffer(&self, buffer: VulkanBuffer) {
        self.destroy_buffer(buffer);
    }

    fn create_structure(
        &self,
        level: StructureLevel,
        buffer: &VulkanBuffer,
        size: u64,
    ) -> Result<vk::AccelerationStructureKHR> {
        trace!("Creating {:?} level structure of {} bytes", level, size);

        unsafe {
            self.ext_acceleration_structure
                .create_acceleration_structure(
                    &vk::AccelerationStructureCreateInfoKHR::builder()
                        .ty(translate_level(level))
                        .buffer(buffer.handle)
                        .offset(0)
                        .size(size),
                    None,
                )
                .map_err_strata()
        }
    }

    fn structure_address(&self, structure: vk::AccelerationStructureKHR) -> DeviceAddress {
        unsafe {
            self.ext_acceleration_structure
                .get_acceleration_structure_device_address(
                    &vk::AccelerationStructureDeviceAddressInfoKHR::builder()
                        .acceleration_structure(structure),
                )
        }
    }

    unsafe fn destroy_structure(&self, structure: vk::AccelerationStructureKHR) {
        self.ext_acceleration_structure
            .destroy_acceleration_structure(structure, None);
    }

    fn create_compacted_size_queries(&self, count: u32) -> Result<vk::QueryPool> {
        unsafe {
            self.device
                .create_query_pool(
                    &vk::QueryPoolCreateInfo::builder()
                        .query_type(vk::QueryType::ACCELERATION_STRUCTURE_COMPACTED_SIZE_KHR)
                        .query_count(count),
                    None,
                )
                .map_err_strata()
        }
    }

    fn read_compacted_sizes(
        &self,
        pool: vk::QueryPool,
        first: u32,
        count: u32,
    ) -> Result<Vec<u64>> {
        let mut sizes = vec![0u64; count as usize];
        unsafe {
            self.device
                .get_query_pool_results(
                    pool,
                    first,
                    count,
                    &mut sizes,
                    vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
                )
                .map_err_strata()?;
        }

        Ok(sizes)
    }

    unsafe fn destroy_query_pool(&self, pool: vk::QueryPool) {
        self.device.destroy_query_pool(pool, None);
    }

    fn submit_and_wait(&self, commands: &CommandContext<'_, Self>) -> Result<()> {
        self.submit_commands_and_wait(commands)
    }
}
