use crate::geometry::BuildFlags;

/// 256 MB, decimal, like the vendor samples.
pub const DEFAULT_BATCH_LIMIT: u64 = 256_000_000;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RegistryConfig {
    /// Summed structure size above which a BLAS batch is submitted.
    pub batch_limit: u64,
    /// Used when building straight from meshes.
    pub default_flags: BuildFlags,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            default_flags: BuildFlags::PREFER_FAST_TRACE,
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_limit(mut self, limit: u64) -> Self {
        assert!(limit > 0, "Batch limit can't be 0");
        self.batch_limit = limit;
        self
    }

    pub fn with_default_flags(mut self, flags: BuildFlags) -> Self {
        self.default_flags = flags;
        self
    }
}
