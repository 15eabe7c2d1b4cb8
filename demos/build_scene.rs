use glam::{Mat4, Vec3};
use log::info;
use strata::{
    AccelerationBackend, Barrier, BuildFlags, BufferUsage, CommandContext, MemoryLocation, Mesh,
    RegistryConfig, ScenePlacement, StructureRegistry, VertexPosNormUvF32,
};
use strata_vulkan::{VulkanBackend, VulkanBuffer, VulkanInitializer};

const OBJECT_COUNT: u32 = 10;

/// Vertex and index buffers of one triangle, ready to be read by a build.
fn upload_triangle(backend: &VulkanBackend, size: f32) -> anyhow::Result<(Mesh, [VulkanBuffer; 2])> {
    let vertices = [[0.0, 0.0, 0.0], [size, 0.0, 0.0], [0.0, size, 0.0]].map(|pos| {
        VertexPosNormUvF32 {
            pos,
            norm: [0.0, 0.0, 1.0],
            uv: [0.0; 2],
        }
    });
    let indices = [0u32, 1, 2];

    let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(&indices);

    let vertex_buffer = backend.alloc_buffer(
        vertex_bytes.len() as _,
        BufferUsage::BUILD_INPUT | BufferUsage::VERTEX_BUFFER,
        MemoryLocation::Gpu,
        "Vertex Buffer",
    )?;
    let index_buffer = backend.alloc_buffer(
        index_bytes.len() as _,
        BufferUsage::BUILD_INPUT | BufferUsage::INDEX_BUFFER,
        MemoryLocation::Gpu,
        "Index Buffer",
    )?;

    {
        let mut ctx = CommandContext::new();
        ctx.upload(backend, &vertex_buffer, vertex_bytes)?;
        ctx.upload(backend, &index_buffer, index_bytes)?;
        ctx.barrier(Barrier::TransferToBuild);
        ctx.submit_and_wait(backend)?;
    }

    let mesh = Mesh::single::<VertexPosNormUvF32, u32>(
        backend.buffer_address(&vertex_buffer),
        vertices.len() as _,
        backend.buffer_address(&index_buffer),
        indices.len() as _,
    );

    Ok((mesh, [vertex_buffer, index_buffer]))
}

fn placements(time: f32) -> Vec<ScenePlacement> {
    (0..OBJECT_COUNT)
        .map(|i| ScenePlacement {
            transform: Mat4::from_translation(Vec3::new(i as f32 * 2.0, time.sin(), -5.0)),
            object_index: i,
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let backend = VulkanInitializer::new()
        .with_name("Build scene")
        .build()?
        .pick_physical_device()?
        .build()?;

    let mut meshes = Vec::new();
    let mut buffers = Vec::new();
    for i in 0..OBJECT_COUNT {
        let (mesh, mesh_buffers) = upload_triangle(&backend, 1.0 + i as f32 * 0.1)?;
        meshes.push(mesh);
        buffers.extend(mesh_buffers);
    }

    // Small limit to get a few batches out of tiny meshes
    let config = RegistryConfig::new()
        .with_batch_limit(4096)
        .with_default_flags(BuildFlags::PREFER_FAST_TRACE | BuildFlags::ALLOW_COMPACTION);

    let res = StructureRegistry::scope(&backend, config, |registry| -> anyhow::Result<()> {
        registry.create_blas(&backend, &meshes)?;
        for i in 0..registry.blas_count() {
            info!("BLAS #{}: {:?}", i, registry.blas(i));
        }

        let tlas_flags = BuildFlags::PREFER_FAST_TRACE | BuildFlags::ALLOW_UPDATE;
        let instances = registry.instances_for(&placements(0.0));
        registry.build_tlas(&backend, &instances, tlas_flags, false, false)?;
        info!("TLAS: {:?}", registry.tlas());

        let instances = registry.instances_for(&placements(1.0));
        registry.build_tlas(&backend, &instances, tlas_flags, true, false)?;
        info!("Refitted TLAS: {:?}", registry.acceleration_structure());

        Ok(())
    });

    for buffer in buffers {
        unsafe { backend.free_buffer(buffer) };
    }

    res
}
