use log::trace;

use crate::{
    backend::{AccelerationBackend, BufferUsage, MemoryLocation, StructureLevel},
    errors::Result,
    geometry::{BuildFlags, BuildRange, GeometryData},
    DeviceAddress,
};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BuildMode {
    Build,
    /// Refit `src` into `dst`, which may be the same structure.
    Update,
}

/// Global memory dependencies the builders need.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Barrier {
    /// Acceleration structure write -> acceleration structure read, at the build stage.
    /// Separates two builds sharing one scratch buffer, and a build from the query of
    /// its compacted size.
    BuildToBuild,
    /// Transfer write -> acceleration structure write.
    TransferToBuild,
}

pub struct BuildCommand<'a, B: AccelerationBackend> {
    pub level: StructureLevel,
    pub flags: BuildFlags,
    pub mode: BuildMode,
    pub geometry: GeometryData<'a>,
    pub ranges: &'a [BuildRange],
    pub src: Option<B::Structure>,
    pub dst: B::Structure,
    pub scratch: DeviceAddress,
}

pub enum Command<'a, B: AccelerationBackend> {
    /// The staging buffer is owned by the context and freed once the context retired.
    Upload {
        staging: B::Buffer,
        dst: &'a B::Buffer,
        size: u64,
    },
    Barrier(Barrier),
    ResetQueries {
        pool: B::QueryPool,
        first: u32,
        count: u32,
    },
    Build(BuildCommand<'a, B>),
    WriteCompactedSize {
        structure: B::Structure,
        pool: B::QueryPool,
        query: u32,
    },
    CopyCompact {
        src: B::Structure,
        dst: B::Structure,
    },
}

/// Short lived list of device commands, executed in order by
/// [`AccelerationBackend::submit_and_wait`].
pub struct CommandContext<'a, B: AccelerationBackend> {
    commands: Vec<Command<'a, B>>,
}

impl<'a, B: AccelerationBackend> Default for CommandContext<'a, B> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

impl<'a, B: AccelerationBackend> CommandContext<'a, B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `data` and records its copy at the start of `dst`.
    pub fn upload(&mut self, backend: &B, dst: &'a B::Buffer, data: &[u8]) -> Result<B::Error, ()> {
        if data.is_empty() {
            return Ok(());
        }

        let size = data.len() as u64;
        let staging = backend.alloc_buffer(
            size,
            BufferUsage::STAGING,
            MemoryLocation::CpuToGpu,
            &format!("Staging Buffer (size: {})", size),
        )?;

        if let Err(err) = backend.write_buffer(&staging, data) {
            unsafe { backend.free_buffer(staging) };
            return Err(err);
        }

        trace!("Recorded upload of {} bytes", size);
        self.commands.push(Command::Upload { staging, dst, size });
        Ok(())
    }

    pub fn barrier(&mut self, barrier: Barrier) {
        self.commands.push(Command::Barrier(barrier));
    }

    pub fn build(&mut self, build: BuildCommand<'a, B>) {
        self.commands.push(Command::Build(build));
    }

    pub fn reset_queries(&mut self, pool: B::QueryPool, first: u32, count: u32) {
        self.commands
            .push(Command::ResetQueries { pool, first, count });
    }

    pub fn write_compacted_size(&mut self, structure: B::Structure, pool: B::QueryPool, query: u32) {
        self.commands.push(Command::WriteCompactedSize {
            structure,
            pool,
            query,
        });
    }

    pub fn copy_compact(&mut self, src: B::Structure, dst: B::Structure) {
        self.commands.push(Command::CopyCompact { src, dst });
    }

    pub fn commands(&self) -> &[Command<'a, B>] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Runs the context to completion, then frees the staging buffers it owns.
    pub fn submit_and_wait(self, backend: &B) -> Result<B::Error, ()> {
        let res = backend.submit_and_wait(&self);
        trace!("Retired command context of {} commands", self.commands.len());
        self.discard(backend);
        res
    }

    /// Drops the context without submitting it.
    pub fn discard(self, backend: &B) {
        for command in self.commands {
            if let Command::Upload { staging, .. } = command {
                unsafe { backend.free_buffer(staging) };
            }
        }
    }
}
