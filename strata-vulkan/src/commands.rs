use std::slice::from_ref;

use ash::vk;
use log::{debug, trace};
use strata::{Barrier, Command, CommandContext};

use crate::{
    acceleration::BuildInfo,
    errors::{Result, VkErrorExt},
    VulkanBackend,
};

pub(crate) fn translate_barrier(barrier: Barrier) -> vk::MemoryBarrier2 {
    let builder = match barrier {
        Barrier::BuildToBuild => vk::MemoryBarrier2::builder()
            .src_stage_mask(vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR)
            .src_access_mask(vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR)
            .dst_stage_mask(vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR)
            .dst_access_mask(vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR),
        Barrier::TransferToBuild => vk::MemoryBarrier2::builder()
            .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
            .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR)
            .dst_access_mask(vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR),
    };
    builder.build()
}

impl VulkanBackend {
    #[inline]
    pub(crate) unsafe fn record_one_time_command_buffer(
        &self,
        pool: vk::CommandPool,
        actions: impl FnOnce(vk::CommandBuffer),
    ) -> Result<vk::CommandBuffer> {
        let cmd = self
            .device
            .allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::builder()
                    .command_pool(pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1),
            )
            .map_err_strata()?[0];

        let recorded = self
            .device
            .begin_command_buffer(
                cmd,
                &vk::CommandBufferBeginInfo::builder()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )
            .and_then(|_| {
                actions(cmd);
                self.device.end_command_buffer(cmd)
            });

        if let Err(err) = recorded {
            self.device.free_command_buffers(pool, from_ref(&cmd));
            return Err(err).map_err_strata();
        }

        Ok(cmd)
    }

    pub(crate) unsafe fn cmd_record(&self, cmd: vk::CommandBuffer, commands: &CommandContext<'_, Self>) {
        let ext_as = &self.ext_acceleration_structure;

        for command in commands.commands() {
            match command {
                Command::Upload { staging, dst, size } => {
                    self.device.cmd_copy_buffer(
                        cmd,
                        staging.handle,
                        dst.handle,
                        from_ref(
                            &vk::BufferCopy::builder()
                                .size(*size)
                                .src_offset(0)
                                .dst_offset(0),
                        ),
                    );
                }
                Command::Barrier(barrier) => {
                    self.device.cmd_pipeline_barrier2(
                        cmd,
                        &vk::DependencyInfo::builder()
                            .memory_barriers(from_ref(&translate_barrier(*barrier))),
                    );
                }
                Command::ResetQueries { pool, first, count } => {
                    self.device.cmd_reset_query_pool(cmd, *pool, *first, *count);
                }
                Command::Build(build) => {
                    let info = BuildInfo::new(build);
                    ext_as.cmd_build_acceleration_structures(
                        cmd,
                        from_ref(&info.geometry_info()),
                        from_ref(&info.ranges.as_slice()),
                    );
                }
                Command::WriteCompactedSize {
                    structure,
                    pool,
                    query,
                } => {
                    ext_as.cmd_write_acceleration_structures_properties(
                        cmd,
                        from_ref(structure),
                        vk::QueryType::ACCELERATION_STRUCTURE_COMPACTED_SIZE_KHR,
                        *pool,
                        *query,
                    );
                }
                Command::CopyCompact { src, dst } => {
                    ext_as.cmd_copy_acceleration_structure(
                        cmd,
                        &vk::CopyAccelerationStructureInfoKHR::builder()
                            .src(*src)
                            .dst(*dst)
                            .mode(vk::CopyAccelerationStructureModeKHR::COMPACT),
                    );
                }
            }
        }
    }

    /// Records, submits and blocks until the queue is done with it.
    pub(crate) fn submit_commands_and_wait(&self, commands: &CommandContext<'_, Self>) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }

        let queue = self.queue.lock();
        unsafe {
            let cmd = self.record_one_time_command_buffer(queue.pool, |cmd| {
                self.cmd_record(cmd, commands)
            })?;

            let res = self.submit_and_wait_raw(queue.queue, cmd);
            self.device.free_command_buffers(queue.pool, from_ref(&cmd));
            res?;
        }

        debug!("Retired submission of {} commands", commands.commands().len());
        Ok(())
    }

    unsafe fn submit_and_wait_raw(&self, queue: vk::Queue, cmd: vk::CommandBuffer) -> Result<()> {
        let fence = self
            .device
            .create_fence(&vk::FenceCreateInfo::builder(), None)
            .map_err_strata()?;

        let cmds = [cmd];
        let info = vk::SubmitInfo::builder().command_buffers(&cmds);
        let res = self
            .device
            .queue_submit(queue, from_ref(&info), fence)
            .and_then(|_| {
                trace!("Waiting on submission");
                self.device.wait_for_fences(from_ref(&fence), true, u64::MAX)
            });

        self.device.destroy_fence(fence, None);
        res.map_err_strata()
    }
}
