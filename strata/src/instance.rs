use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::DeviceAddress;

/// 3x4 row major affine transform, the layout the builder consumes.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TransformMatrix {
    pub matrix: [f32; 12],
}

#[rustfmt::skip]
impl TransformMatrix {
    pub const IDENTITY: Self = Self {
        matrix: [
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
        ],
    };
}

impl Default for TransformMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<glam::Mat4> for TransformMatrix {
    /// glam is column major, so keep the first three rows.
    fn from(m: glam::Mat4) -> Self {
        let mut matrix = [0.0; 12];
        for row in 0..3 {
            matrix[row * 4..row * 4 + 4].copy_from_slice(&m.row(row).to_array());
        }
        Self { matrix }
    }
}

impl From<glam::Affine3A> for TransformMatrix {
    fn from(a: glam::Affine3A) -> Self {
        glam::Mat4::from(a).into()
    }
}

impl From<TransformMatrix> for glam::Affine3A {
    fn from(t: TransformMatrix) -> Self {
        let m = &t.matrix;
        glam::Affine3A::from_cols(
            glam::Vec3A::new(m[0], m[4], m[8]),
            glam::Vec3A::new(m[1], m[5], m[9]),
            glam::Vec3A::new(m[2], m[6], m[10]),
            glam::Vec3A::new(m[3], m[7], m[11]),
        )
    }
}

bitflags! {
    // Same bits as VkGeometryInstanceFlagBitsKHR.
    pub struct InstanceFlags: u8 {
        const TRIANGLE_FACING_CULL_DISABLE = 0x1;
        const TRIANGLE_FLIP_FACING = 0x2;
        const FORCE_OPAQUE = 0x4;
        const FORCE_NO_OPAQUE = 0x8;
    }
}

/// One TLAS entry, byte compatible with `VkAccelerationStructureInstanceKHR`.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Instance {
    pub transform: TransformMatrix,
    custom_index_and_mask: u32,
    sbt_offset_and_flags: u32,
    pub blas_address: DeviceAddress,
}

const LOW_24: u32 = 0x00ff_ffff;

impl Instance {
    /// Visible to every ray (mask `0xFF`), hit group 0, no flags.
    pub fn new(transform: TransformMatrix, custom_index: u32, blas_address: DeviceAddress) -> Self {
        Self {
            transform,
            custom_index_and_mask: pack_24_8(custom_index, 0xFF),
            sbt_offset_and_flags: 0,
            blas_address,
        }
    }

    pub fn mask(mut self, mask: u8) -> Self {
        self.custom_index_and_mask = pack_24_8(self.custom_index(), mask);
        self
    }

    pub fn sbt_record_offset(mut self, offset: u32) -> Self {
        self.sbt_offset_and_flags = pack_24_8(offset, self.flags().bits());
        self
    }

    pub fn instance_flags(mut self, flags: InstanceFlags) -> Self {
        self.sbt_offset_and_flags = pack_24_8(self.sbt_offset(), flags.bits());
        self
    }

    pub fn custom_index(&self) -> u32 {
        self.custom_index_and_mask & LOW_24
    }

    pub fn visibility_mask(&self) -> u8 {
        (self.custom_index_and_mask >> 24) as u8
    }

    pub fn sbt_offset(&self) -> u32 {
        self.sbt_offset_and_flags & LOW_24
    }

    pub fn flags(&self) -> InstanceFlags {
        InstanceFlags::from_bits_truncate((self.sbt_offset_and_flags >> 24) as u8)
    }
}

fn pack_24_8(low_24: u32, high_8: u8) -> u32 {
    debug_assert!(low_24 <= LOW_24, "{} doesn't fit in 24 bits", low_24);
    (low_24 & LOW_24) | ((high_8 as u32) << 24)
}

/// Where an object of the scene sits, `object_index` being its BLAS index.
#[derive(Debug, Copy, Clone)]
pub struct ScenePlacement {
    pub transform: glam::Mat4,
    pub object_index: u32,
}
