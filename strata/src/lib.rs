//! Bottom-level and top-level acceleration structure building on top of a
//! pluggable device backend.
//!
//! The backend (see [`backend::AccelerationBackend`]) owns every GPU resource
//! and executes command contexts synchronously. [`StructureRegistry`] drives it
//! and owns the structures that come out.

pub mod backend;
pub mod blas;
pub mod commands;
pub mod config;
pub mod geometry;
pub mod instance;
pub mod registry;
pub mod tlas;

pub use backend::{AccelerationBackend, BuildSizes, BufferUsage, MemoryLocation, StructureLevel};
pub use commands::{Barrier, BuildCommand, BuildMode, Command, CommandContext};
pub use config::RegistryConfig;
pub use geometry::{
    BuildFlags, BuildRange, GeometryData, GeometryFlags, GeometryInput, IndexType, Mesh,
    MeshIndex, MeshVertex, SubMesh, TriangleGeometry, VertexFormat, VertexPosNormUvF32,
};
pub use instance::{Instance, InstanceFlags, ScenePlacement, TransformMatrix};
pub use registry::{BuiltStructure, StructureRegistry};

/// Raw GPU virtual address.
pub type DeviceAddress = u64;

pub mod errors {
    use std::error::Error;
    use thiserror::Error;

    pub type Result<B, T> = std::result::Result<T, StrataError<B>>;

    pub trait BackendError: Error {}

    #[derive(Error, Debug)]
    pub enum StrataError<BACKEND: BackendError> {
        #[error("Compacted size query returned {0} results, expected {1}")]
        CompactedSizeMismatch(usize, usize),
        #[error("{0}")]
        BackendError(#[from] BACKEND),
    }
}
