// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The per-object uniform block shared by draws and the light-culling kernel.

use crate::math::Mat4;

/// Per-object data uploaded before every draw and before a light-culling dispatch.
///
/// The layout is `#[repr(C)]` with 16-byte alignment of every member group,
/// matching the uniform block declared by the shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PerObjectUniforms {
    /// Object space to clip space.
    pub local_to_clip: Mat4,
    /// Object space to view space.
    pub local_to_view: Mat4,
    /// Object space to world space.
    pub local_to_world: Mat4,
    /// Object space to shadow-map texture space.
    pub local_to_shadow_clip: Mat4,
    /// Clip space back to view space; the inverse projection.
    pub clip_to_view: Mat4,
    /// Width of the target being shaded, in pixels.
    pub window_width: i32,
    /// Height of the target being shaded, in pixels.
    pub window_height: i32,
    /// Spot light count in the high 16 bits, point light count in the low 16 bits.
    pub num_lights: u32,
    /// Capacity of one tile in the light index buffer.
    pub max_num_lights_per_tile: u32,
    /// Reflectance at normal incidence.
    pub f0: f32,
    /// Pads the block to a 16-byte boundary.
    pub _padding: [f32; 3],
}

impl Default for PerObjectUniforms {
    fn default() -> Self {
        Self {
            local_to_clip: Mat4::IDENTITY,
            local_to_view: Mat4::IDENTITY,
            local_to_world: Mat4::IDENTITY,
            local_to_shadow_clip: Mat4::IDENTITY,
            clip_to_view: Mat4::IDENTITY,
            window_width: 0,
            window_height: 0,
            num_lights: 0,
            max_num_lights_per_tile: 0,
            f0: 0.8,
            _padding: [0.0; 3],
        }
    }
}

impl PerObjectUniforms {
    /// Packs the two light counts the way the culling kernel unpacks them.
    pub const fn pack_light_counts(point_lights: u32, spot_lights: u32) -> u32 {
        ((spot_lights & 0xFFFF) << 16) | (point_lights & 0xFFFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_is_a_multiple_of_16() {
        assert_eq!(std::mem::size_of::<PerObjectUniforms>(), 352);
        assert_eq!(std::mem::size_of::<PerObjectUniforms>() % 16, 0);
    }

    #[test]
    fn light_counts_pack_spot_high_point_low() {
        assert_eq!(PerObjectUniforms::pack_light_counts(3, 2), 0x0002_0003);
        assert_eq!(PerObjectUniforms::pack_light_counts(0x1_0001, 0), 1);
    }
}
