use std::fmt;

use log::{debug, error, trace};

use crate::{
    backend::{AccelerationBackend, BufferUsage, MemoryLocation, StructureLevel},
    config::RegistryConfig,
    errors::Result,
    geometry::BuildFlags,
    DeviceAddress,
};

/// An acceleration structure and the buffer it lives in.
pub struct BuiltStructure<B: AccelerationBackend> {
    pub(crate) handle: B::Structure,
    pub(crate) buffer: B::Buffer,
    pub(crate) address: DeviceAddress,
    pub(crate) size: u64,
    pub(crate) level: StructureLevel,
    pub(crate) flags: BuildFlags,
    /// Instance count for a TLAS, sum of all geometries for a BLAS.
    pub(crate) primitive_count: u32,
}

impl<B: AccelerationBackend> BuiltStructure<B> {
    /// Backing buffer and structure object, not built yet.
    pub(crate) fn allocate(
        backend: &B,
        level: StructureLevel,
        size: u64,
        flags: BuildFlags,
        primitive_count: u32,
        name: &str,
    ) -> Result<B::Error, Self> {
        trace!("Allocating {:?} structure of {} bytes", level, size);

        let buffer = backend.alloc_buffer(
            size,
            BufferUsage::STRUCTURE_STORAGE,
            MemoryLocation::Gpu,
            name,
        )?;

        let handle = match backend.create_structure(level, &buffer, size) {
            Ok(handle) => handle,
            Err(err) => {
                unsafe { backend.free_buffer(buffer) };
                return Err(err);
            }
        };

        Ok(Self {
            handle,
            buffer,
            address: backend.structure_address(handle),
            size,
            level,
            flags,
            primitive_count,
        })
    }

    /// # Safety
    /// No pending device work may reference the structure.
    pub(crate) unsafe fn destroy(self, backend: &B) {
        backend.destroy_structure(self.handle);
        backend.free_buffer(self.buffer);
    }

    pub fn handle(&self) -> B::Structure {
        self.handle
    }

    pub fn buffer(&self) -> &B::Buffer {
        &self.buffer
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn level(&self) -> StructureLevel {
        self.level
    }

    pub fn flags(&self) -> BuildFlags {
        self.flags
    }

    pub fn primitive_count(&self) -> u32 {
        self.primitive_count
    }
}

impl<B: AccelerationBackend> fmt::Debug for BuiltStructure<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltStructure")
            .field("handle", &self.handle)
            .field("address", &format_args!("{:#x}", self.address))
            .field("size", &self.size)
            .field("level", &self.level)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Owns every BLAS, indexed in build order, and the scene TLAS.
///
/// The backend is never stored: every operation touching the device takes it as a
/// parameter, and [`destroy`](Self::destroy) must be called with the same backend
/// before the registry goes away (or use [`scope`](Self::scope)).
pub struct StructureRegistry<B: AccelerationBackend> {
    pub(crate) config: RegistryConfig,
    pub(crate) blas: Vec<BuiltStructure<B>>,
    pub(crate) tlas: Option<BuiltStructure<B>>,
}

impl<B: AccelerationBackend> StructureRegistry<B> {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            blas: Vec::new(),
            tlas: None,
        }
    }

    /// Runs `f` with a fresh registry and destroys it afterwards, whether `f`
    /// returns, fails or panics.
    pub fn scope<R>(backend: &B, config: RegistryConfig, f: impl FnOnce(&mut Self) -> R) -> R {
        let mut guard = DestroyOnDrop {
            backend,
            registry: Self::new(config),
        };
        f(&mut guard.registry)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// # Panics
    /// If no TLAS was built yet.
    pub fn acceleration_structure(&self) -> B::Structure {
        self.tlas
            .as_ref()
            .map(|tlas| tlas.handle)
            .expect("No TLAS built yet")
    }

    pub fn tlas(&self) -> Option<&BuiltStructure<B>> {
        self.tlas.as_ref()
    }

    /// # Panics
    /// If `index` is not the index of a built BLAS.
    pub fn blas_device_address(&self, index: usize) -> DeviceAddress {
        self.blas(index).address
    }

    /// # Panics
    /// If `index` is not the index of a built BLAS.
    pub fn blas(&self, index: usize) -> &BuiltStructure<B> {
        assert!(
            index < self.blas.len(),
            "BLAS index {} out of range ({} built)",
            index,
            self.blas.len()
        );
        &self.blas[index]
    }

    pub fn blas_count(&self) -> usize {
        self.blas.len()
    }

    /// Releases every BLAS, then the TLAS.
    ///
    /// The device must be done with all of them. Calling it again is a no-op.
    pub fn destroy(&mut self, backend: &B) {
        if self.blas.is_empty() && self.tlas.is_none() {
            return;
        }

        debug!(
            "Destroying {} BLAS and {} TLAS",
            self.blas.len(),
            self.tlas.is_some() as u8
        );

        unsafe {
            for blas in self.blas.drain(..) {
                blas.destroy(backend);
            }

            if let Some(tlas) = self.tlas.take() {
                tlas.destroy(backend);
            }
        }
    }
}

impl<B: AccelerationBackend> Drop for StructureRegistry<B> {
    fn drop(&mut self) {
        let alive = self.blas.len() + self.tlas.is_some() as usize;
        if alive > 0 {
            error!(
                "Registry dropped without being destroyed, leaking {} acceleration structures",
                alive
            );
        }
    }
}

struct DestroyOnDrop<'b, B: AccelerationBackend> {
    backend: &'b B,
    registry: StructureRegistry<B>,
}

impl<B: AccelerationBackend> Drop for DestroyOnDrop<'_, B> {
    fn drop(&mut self) {
        self.registry.destroy(self.backend);
    }
}
