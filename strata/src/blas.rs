use std::{mem, ops::Range};

use log::{debug, info};

use crate::{
    backend::{AccelerationBackend, BufferUsage, BuildSizes, MemoryLocation, StructureLevel},
    commands::{Barrier, BuildCommand, BuildMode, CommandContext},
    errors::{Result, StrataError},
    geometry::{BuildFlags, GeometryData, GeometryInput, Mesh},
    registry::{BuiltStructure, StructureRegistry},
    DeviceAddress,
};

/// Where a BLAS is in the build then compact protocol.
enum JobStage<B: AccelerationBackend> {
    /// Sizes are known, nothing allocated.
    Sized,
    /// Built on the device, compacted size maybe pending in the query pool.
    Built(BuiltStructure<B>),
    /// Both are alive until the compacting copy is retired.
    Compacting {
        original: BuiltStructure<B>,
        compacted: BuiltStructure<B>,
    },
    Final(BuiltStructure<B>),
}

struct BuildJob<'a, B: AccelerationBackend> {
    input: &'a GeometryInput,
    flags: BuildFlags,
    sizes: BuildSizes,
    primitive_count: u32,
    stage: JobStage<B>,
}

impl<'a, B: AccelerationBackend> BuildJob<'a, B> {
    fn size(backend: &B, input: &'a GeometryInput, flags: BuildFlags) -> Self {
        assert!(!input.is_empty(), "BLAS input without any geometry");

        let flags = input.flags | flags;
        let max_primitive_counts = input.max_primitive_counts();
        let sizes = backend.build_sizes(
            StructureLevel::Bottom,
            flags,
            &GeometryData::Triangles(input.geometries()),
            &max_primitive_counts,
        );

        Self {
            input,
            flags,
            sizes,
            primitive_count: max_primitive_counts.iter().sum(),
            stage: JobStage::Sized,
        }
    }

    fn wants_compaction(&self) -> bool {
        self.flags.contains(BuildFlags::ALLOW_COMPACTION)
    }

    fn allocate(&mut self, backend: &B, index: usize) -> Result<B::Error, ()> {
        debug_assert!(matches!(self.stage, JobStage::Sized));

        let size = self.sizes.structure_size;
        let structure = BuiltStructure::allocate(
            backend,
            StructureLevel::Bottom,
            size,
            self.flags,
            self.primitive_count,
            &format!("BLAS #{} (size: {})", index, size),
        )?;
        self.stage = JobStage::Built(structure);
        Ok(())
    }

    fn built(&self) -> B::Structure {
        match &self.stage {
            JobStage::Built(structure) => structure.handle,
            _ => unreachable!("BLAS is not in the built stage"),
        }
    }

    fn begin_compaction(&mut self, compacted: BuiltStructure<B>) {
        self.stage = match mem::replace(&mut self.stage, JobStage::Sized) {
            JobStage::Built(original) => JobStage::Compacting {
                original,
                compacted,
            },
            _ => unreachable!("Only a built BLAS can be compacted"),
        };
    }

    fn compaction_pair(&self) -> (B::Structure, B::Structure) {
        match &self.stage {
            JobStage::Compacting {
                original,
                compacted,
            } => (original.handle, compacted.handle),
            _ => unreachable!("BLAS is not being compacted"),
        }
    }

    /// # Safety
    /// The compacting copy must be retired.
    unsafe fn finish_compaction(&mut self, backend: &B) {
        self.stage = match mem::replace(&mut self.stage, JobStage::Sized) {
            JobStage::Compacting {
                original,
                compacted,
            } => {
                original.destroy(backend);
                JobStage::Final(compacted)
            }
            _ => unreachable!("BLAS is not being compacted"),
        };
    }

    fn finish(&mut self) {
        self.stage = match mem::replace(&mut self.stage, JobStage::Sized) {
            JobStage::Built(structure) => JobStage::Final(structure),
            _ => unreachable!("BLAS is not in the built stage"),
        };
    }

    fn final_size(&self) -> u64 {
        match &self.stage {
            JobStage::Final(structure) => structure.size,
            _ => 0,
        }
    }

    fn into_structure(self) -> BuiltStructure<B> {
        match self.stage {
            JobStage::Final(structure) => structure,
            _ => unreachable!("BLAS job left unfinished"),
        }
    }

    /// Destroys whatever this job allocated so far.
    ///
    /// # Safety
    /// No pending device work may reference its structures.
    unsafe fn release(&mut self, backend: &B) {
        match mem::replace(&mut self.stage, JobStage::Sized) {
            JobStage::Sized => {}
            JobStage::Built(structure) | JobStage::Final(structure) => structure.destroy(backend),
            JobStage::Compacting {
                original,
                compacted,
            } => {
                original.destroy(backend);
                compacted.destroy(backend);
            }
        }
    }
}

impl<B: AccelerationBackend> StructureRegistry<B> {
    /// Builds one BLAS per mesh with the configured default flags.
    pub fn create_blas<'m>(
        &mut self,
        backend: &B,
        meshes: impl IntoIterator<Item = &'m Mesh>,
    ) -> Result<B::Error, ()> {
        let inputs = meshes
            .into_iter()
            .map(|mesh| GeometryInput::from_mesh(mesh, BuildFlags::empty()))
            .collect::<Vec<_>>();

        self.build_blas(backend, &inputs, self.config.default_flags)
    }

    /// Builds one BLAS per input and appends them in input order.
    ///
    /// `flags` is combined with the flags of every input. Compaction must be asked
    /// for every input or for none.
    ///
    /// On error, nothing built by this call survives and the registry is unchanged.
    pub fn build_blas(
        &mut self,
        backend: &B,
        inputs: &[GeometryInput],
        flags: BuildFlags,
    ) -> Result<B::Error, ()> {
        if inputs.is_empty() {
            debug!("No BLAS to build");
            return Ok(());
        }

        let mut jobs = inputs
            .iter()
            .map(|input| BuildJob::size(backend, input, flags))
            .collect::<Vec<_>>();

        let total_size = jobs.iter().map(|j| j.sizes.structure_size).sum::<u64>();
        let max_scratch_size = jobs
            .iter()
            .map(|j| j.sizes.build_scratch_size)
            .max()
            .unwrap_or(0);
        let compactions = jobs.iter().filter(|j| j.wants_compaction()).count();

        assert!(
            compactions == 0 || compactions == jobs.len(),
            "Compaction asked for {} BLAS out of {}, it's all or nothing",
            compactions,
            jobs.len()
        );

        let scratch = backend.alloc_buffer(
            max_scratch_size,
            BufferUsage::SCRATCH,
            MemoryLocation::Gpu,
            "BLAS scratch buffer",
        )?;

        let queries = if compactions > 0 {
            match backend.create_compacted_size_queries(jobs.len() as _) {
                Ok(pool) => Some(pool),
                Err(err) => {
                    unsafe { backend.free_buffer(scratch) };
                    return Err(err);
                }
            }
        } else {
            None
        };

        let res = self.build_batches(backend, &mut jobs, &scratch, queries);

        unsafe {
            if let Some(pool) = queries {
                backend.destroy_query_pool(pool);
            }
            backend.free_buffer(scratch);
        }

        if let Err(err) = res {
            for job in jobs.iter_mut() {
                unsafe { job.release(backend) };
            }
            return Err(err);
        }

        let final_size = jobs.iter().map(BuildJob::final_size).sum::<u64>();
        if queries.is_some() {
            info!(
                "Built {} BLAS, compacted from {} to {} bytes ({:.1}% saved)",
                jobs.len(),
                total_size,
                final_size,
                100.0 * (total_size - final_size.min(total_size)) as f64 / total_size.max(1) as f64
            );
        } else {
            info!("Built {} BLAS ({} bytes)", jobs.len(), final_size);
        }

        self.blas
            .extend(jobs.into_iter().map(BuildJob::into_structure));
        Ok(())
    }

    fn build_batches(
        &self,
        backend: &B,
        jobs: &mut [BuildJob<'_, B>],
        scratch: &B::Buffer,
        queries: Option<B::QueryPool>,
    ) -> Result<B::Error, ()> {
        let scratch_address = backend.buffer_address(scratch);
        let sizes = jobs
            .iter()
            .map(|j| j.sizes.structure_size)
            .collect::<Vec<_>>();

        for batch in plan_batches(&sizes, self.config.batch_limit) {
            debug!(
                "Building BLAS batch {:?} ({} bytes)",
                batch,
                sizes[batch.clone()].iter().sum::<u64>()
            );

            let first = batch.start;
            let jobs = &mut jobs[batch];
            cmd_build_batch(backend, jobs, first, scratch_address, queries)?;

            match queries {
                Some(pool) => compact_batch(backend, jobs, first as _, pool)?,
                None => jobs.iter_mut().for_each(BuildJob::finish),
            }
        }

        Ok(())
    }

    /// Refits a BLAS in place after its vertices moved.
    ///
    /// # Panics
    /// If the BLAS doesn't exist, wasn't built with [`BuildFlags::ALLOW_UPDATE`] or if
    /// `input` doesn't have the same primitive count.
    pub fn update_blas(
        &mut self,
        backend: &B,
        index: usize,
        input: &GeometryInput,
    ) -> Result<B::Error, ()> {
        let blas = self.blas(index);
        assert!(
            blas.flags.contains(BuildFlags::ALLOW_UPDATE),
            "BLAS {} wasn't built with ALLOW_UPDATE",
            index
        );

        let max_primitive_counts = input.max_primitive_counts();
        assert_eq!(
            blas.primitive_count,
            max_primitive_counts.iter().sum::<u32>(),
            "A refit can't change the primitive count"
        );

        let geometry = GeometryData::Triangles(input.geometries());
        let sizes = backend.build_sizes(
            StructureLevel::Bottom,
            blas.flags,
            &geometry,
            &max_primitive_counts,
        );

        let scratch = backend.alloc_buffer(
            sizes.update_scratch_size,
            BufferUsage::SCRATCH,
            MemoryLocation::Gpu,
            "BLAS update scratch buffer",
        )?;

        let mut ctx = CommandContext::new();
        ctx.build(BuildCommand {
            level: StructureLevel::Bottom,
            flags: blas.flags,
            mode: BuildMode::Update,
            geometry,
            ranges: input.ranges(),
            src: Some(blas.handle),
            dst: blas.handle,
            scratch: backend.buffer_address(&scratch),
        });

        let res = ctx.submit_and_wait(backend);
        unsafe { backend.free_buffer(scratch) };
        res?;

        debug!("Refitted BLAS {}", index);
        Ok(())
    }
}

/// Allocates and builds the structures of one batch in a single submission.
///
/// Every build shares `scratch`, so each one is followed by a barrier before the next
/// can start.
fn cmd_build_batch<B: AccelerationBackend>(
    backend: &B,
    jobs: &mut [BuildJob<'_, B>],
    first: usize,
    scratch: DeviceAddress,
    queries: Option<B::QueryPool>,
) -> Result<B::Error, ()> {
    for (i, job) in jobs.iter_mut().enumerate() {
        job.allocate(backend, first + i)?;
    }

    let mut ctx = CommandContext::new();
    if let Some(pool) = queries {
        ctx.reset_queries(pool, first as _, jobs.len() as _);
    }

    for (query, job) in (first as u32..).zip(jobs.iter()) {
        let input = job.input;
        let dst = job.built();

        ctx.build(BuildCommand {
            level: StructureLevel::Bottom,
            flags: job.flags,
            mode: BuildMode::Build,
            geometry: GeometryData::Triangles(input.geometries()),
            ranges: input.ranges(),
            src: None,
            dst,
            scratch,
        });

        // For scratch buffer
        ctx.barrier(Barrier::BuildToBuild);

        if let Some(pool) = queries {
            ctx.write_compacted_size(dst, pool, query);
        }
    }

    ctx.submit_and_wait(backend)
}

/// Replaces every structure of the batch with a copy sized to its compacted size.
fn compact_batch<B: AccelerationBackend>(
    backend: &B,
    jobs: &mut [BuildJob<'_, B>],
    first: u32,
    pool: B::QueryPool,
) -> Result<B::Error, ()> {
    let compact_sizes = backend.read_compacted_sizes(pool, first, jobs.len() as _)?;
    if compact_sizes.len() != jobs.len() {
        return Err(StrataError::CompactedSizeMismatch(
            compact_sizes.len(),
            jobs.len(),
        ));
    }

    for (i, (job, &size)) in jobs.iter_mut().zip(&compact_sizes).enumerate() {
        let compacted = BuiltStructure::allocate(
            backend,
            StructureLevel::Bottom,
            size,
            job.flags,
            job.primitive_count,
            &format!("Compacted BLAS #{} (size: {})", first as usize + i, size),
        )?;
        job.begin_compaction(compacted);
    }

    let mut ctx = CommandContext::new();
    for job in jobs.iter() {
        let (src, dst) = job.compaction_pair();
        ctx.copy_compact(src, dst);
    }
    ctx.submit_and_wait(backend)?;

    for job in jobs.iter_mut() {
        unsafe { job.finish_compaction(backend) };
    }

    Ok(())
}

/// Splits consecutive structures into batches of at most `limit` bytes.
///
/// A batch is closed when it reaches `limit`, or before a structure that would
/// overflow it. A structure bigger than `limit` gets a batch of its own.
pub(crate) fn plan_batches(sizes: &[u64], limit: u64) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut batch_size = 0u64;

    for (idx, &size) in sizes.iter().enumerate() {
        if idx > start && batch_size.saturating_add(size) > limit {
            batches.push(start..idx);
            start = idx;
            batch_size = 0;
        }

        batch_size = batch_size.saturating_add(size);

        if batch_size >= limit || idx == sizes.len() - 1 {
            batches.push(start..idx + 1);
            start = idx + 1;
            batch_size = 0;
        }
    }

    batches
}
