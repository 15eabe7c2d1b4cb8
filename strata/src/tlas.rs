use std::mem::size_of;

use log::{debug, warn};

use crate::{
    backend::{AccelerationBackend, BufferUsage, MemoryLocation, StructureLevel},
    commands::{Barrier, BuildCommand, BuildMode, CommandContext},
    errors::Result,
    geometry::{BuildFlags, BuildRange, GeometryData},
    instance::{Instance, InstanceFlags, ScenePlacement},
    registry::{BuiltStructure, StructureRegistry},
};

impl<B: AccelerationBackend> StructureRegistry<B> {
    /// One instance per placement, pointing to the BLAS at `object_index`.
    ///
    /// # Panics
    /// If a placement names a BLAS that doesn't exist.
    pub fn instances_for(&self, placements: &[ScenePlacement]) -> Vec<Instance> {
        placements
            .iter()
            .map(|placement| {
                let index = placement.object_index;
                Instance::new(
                    placement.transform.into(),
                    index,
                    self.blas_device_address(index as usize),
                )
                .instance_flags(InstanceFlags::TRIANGLE_FACING_CULL_DISABLE)
            })
            .collect()
    }

    /// Builds the TLAS over `instances`, or refits the current one when `update` is set.
    ///
    /// A fresh build replaces the previous TLAS, which is destroyed once the new one is
    /// ready. A refit keeps the same structure and handle.
    ///
    /// # Panics
    /// When refitting without a TLAS, with a TLAS not built with
    /// [`BuildFlags::ALLOW_UPDATE`] or with a different number of instances.
    pub fn build_tlas(
        &mut self,
        backend: &B,
        instances: &[Instance],
        flags: BuildFlags,
        update: bool,
        motion: bool,
    ) -> Result<B::Error, ()> {
        let mut flags = flags;
        if motion || flags.contains(BuildFlags::MOTION) {
            warn!("Motion blur TLAS are not supported, building a static one");
            flags.remove(BuildFlags::MOTION);
        }

        let count = instances.len() as u32;
        if update {
            let tlas = self
                .tlas
                .as_ref()
                .expect("Can't refit a TLAS that was never built");
            assert!(
                tlas.flags.contains(BuildFlags::ALLOW_UPDATE),
                "TLAS wasn't built with ALLOW_UPDATE"
            );
            assert_eq!(
                tlas.primitive_count, count,
                "A refit can't change the instance count"
            );
            flags = tlas.flags;
        }

        // Never allocate an empty buffer
        let instance_buffer = backend.alloc_buffer(
            (size_of::<Instance>() * instances.len().max(1)) as u64,
            BufferUsage::BUILD_INPUT,
            MemoryLocation::Gpu,
            "TLAS instances",
        )?;

        let res = self.cmd_build_tlas(backend, &instance_buffer, instances, flags, update);
        unsafe { backend.free_buffer(instance_buffer) };

        res
    }

    fn cmd_build_tlas(
        &mut self,
        backend: &B,
        instance_buffer: &B::Buffer,
        instances: &[Instance],
        flags: BuildFlags,
        update: bool,
    ) -> Result<B::Error, ()> {
        let count = instances.len() as u32;
        let geometry = GeometryData::Instances {
            address: backend.buffer_address(instance_buffer),
        };
        let sizes = backend.build_sizes(StructureLevel::Top, flags, &geometry, &[count]);
        let ranges = [BuildRange::primitives(count)];

        let mut ctx = CommandContext::new();
        if let Err(err) = ctx.upload(backend, instance_buffer, bytemuck::cast_slice(instances)) {
            ctx.discard(backend);
            return Err(err);
        }
        ctx.barrier(Barrier::TransferToBuild);

        let (scratch_size, fresh) = if update {
            (sizes.update_scratch_size, None)
        } else {
            let tlas = match BuiltStructure::allocate(
                backend,
                StructureLevel::Top,
                sizes.structure_size,
                flags,
                count,
                &format!("TLAS (size: {})", sizes.structure_size),
            ) {
                Ok(tlas) => tlas,
                Err(err) => {
                    ctx.discard(backend);
                    return Err(err);
                }
            };
            (sizes.build_scratch_size, Some(tlas))
        };

        let scratch = match backend.alloc_buffer(
            scratch_size,
            BufferUsage::SCRATCH,
            MemoryLocation::Gpu,
            "TLAS scratch buffer",
        ) {
            Ok(scratch) => scratch,
            Err(err) => {
                ctx.discard(backend);
                if let Some(tlas) = fresh {
                    unsafe { tlas.destroy(backend) };
                }
                return Err(err);
            }
        };

        let (src, dst) = match (&fresh, &self.tlas) {
            (Some(fresh), _) => (None, fresh.handle),
            (None, Some(current)) => (Some(current.handle), current.handle),
            (None, None) => unreachable!(),
        };

        ctx.build(BuildCommand {
            level: StructureLevel::Top,
            flags,
            mode: if update {
                BuildMode::Update
            } else {
                BuildMode::Build
            },
            geometry,
            ranges: &ranges,
            src,
            dst,
            scratch: backend.buffer_address(&scratch),
        });

        let res = ctx.submit_and_wait(backend);
        unsafe { backend.free_buffer(scratch) };

        if let Err(err) = res {
            if let Some(tlas) = fresh {
                unsafe { tlas.destroy(backend) };
            }
            return Err(err);
        }

        match fresh {
            Some(tlas) => {
                debug!("Built TLAS of {} instances ({} bytes)", count, tlas.size);
                if let Some(old) = self.tlas.replace(tlas) {
                    unsafe { old.destroy(backend) };
                }
            }
            None => debug!("Refitted TLAS of {} instances", count),
        }

        Ok(())
    }
}
