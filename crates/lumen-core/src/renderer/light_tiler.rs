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

//! Screen-tile light culling: a bounded light registry and the GPU buffers
//! consumed by the tile-culling compute kernel.

use crate::math::{Mat4, Vec3, Vec4};
use crate::renderer::api::*;
use crate::renderer::device::GraphicsDevice;
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::traits::GraphicsBackend;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Capacities of the light tiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightTilerConfig {
    /// Edge length of a square screen tile in pixels.
    pub tile_resolution: u32,
    /// Capacity of each of the point and spot light registries.
    pub max_lights: u32,
    /// Per-tile light capacity before the height adjustment.
    pub max_lights_per_tile: u32,
    /// Backbuffer heights above this count as this.
    pub height_cap: u32,
    /// Per-tile capacity removed for every `adjustment_rows` rows.
    pub adjustment_step: u32,
    /// Rows per adjustment step.
    pub adjustment_rows: u32,
}

impl Default for LightTilerConfig {
    fn default() -> Self {
        Self {
            tile_resolution: 16,
            max_lights: 2048,
            max_lights_per_tile: 544,
            height_cap: 1080,
            adjustment_step: 32,
            adjustment_rows: 120,
        }
    }
}

impl LightTilerConfig {
    /// Per-tile light capacity for a backbuffer of `height` rows.
    ///
    /// Taller targets get fewer lights per tile; the result never underflows.
    pub fn max_num_lights_per_tile(&self, height: u32) -> u32 {
        let height = height.min(self.height_cap);
        let steps = height / self.adjustment_rows.max(1);
        self.max_lights_per_tile
            .saturating_sub(self.adjustment_step.saturating_mul(steps))
    }
}

/// The screen partition into tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    /// Tiles along the x axis.
    pub tiles_x: u32,
    /// Tiles along the y axis.
    pub tiles_y: u32,
}

impl TileGrid {
    /// Covers a `width` × `height` target with tiles, rounding partial tiles up.
    pub fn new(width: u32, height: u32, tile_resolution: u32) -> Self {
        let tile_resolution = tile_resolution.max(1);
        Self {
            tiles_x: width.div_ceil(tile_resolution),
            tiles_y: height.div_ceil(tile_resolution),
        }
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> u64 {
        u64::from(self.tiles_x) * u64::from(self.tiles_y)
    }
}

/// The GPU buffers owned by an initialized tiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightTilerBuffers {
    /// Per-tile light indices written by the culling kernel.
    pub light_index: GpuBufferId,
    /// Point light centers and radii.
    pub point_lights: GpuBufferId,
    /// Spot light centers and radii.
    pub spot_lights: GpuBufferId,
}

/// Everything needed to record the tile-culling dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightCullingDispatch {
    /// The culling kernel.
    pub shader: ComputeShaderId,
    /// Thread groups: one per tile.
    pub groups: [u32; 3],
    /// The buffers the kernel reads and writes.
    pub buffers: LightTilerBuffers,
}

#[derive(Debug, Clone, Copy)]
struct InitState {
    height: u32,
    grid: TileGrid,
    buffers: LightTilerBuffers,
}

/// Tracks point and spot lights and prepares the tile-culling pass.
///
/// The active light counts are high-water marks: the highest index ever
/// written plus one. Writing a lower index never lowers them.
#[derive(Debug)]
pub struct LightTiler {
    config: LightTilerConfig,
    point_lights: Vec<Vec4>,
    spot_lights: Vec<Vec4>,
    active_point_lights: u32,
    active_spot_lights: u32,
    state: Option<InitState>,
}

impl Default for LightTiler {
    fn default() -> Self {
        Self::new(LightTilerConfig::default())
    }
}

impl LightTiler {
    /// Creates a tiler with empty registries of `config.max_lights` slots each.
    pub fn new(config: LightTilerConfig) -> Self {
        let capacity = config.max_lights as usize;
        Self {
            config,
            point_lights: vec![Vec4::ZERO; capacity],
            spot_lights: vec![Vec4::ZERO; capacity],
            active_point_lights: 0,
            active_spot_lights: 0,
            state: None,
        }
    }

    /// The capacities this tiler was created with.
    pub fn config(&self) -> &LightTilerConfig {
        &self.config
    }

    /// Sizes and creates the GPU buffers for the current backbuffer.
    ///
    /// The tile grid is fixed from here on; a later backbuffer resize is not
    /// picked up.
    ///
    /// # Errors
    /// Returns `RenderError::Internal` if the tiler is already initialized,
    /// and any error from buffer creation.
    pub fn init<B: GraphicsBackend>(
        &mut self,
        device: &mut GraphicsDevice<B>,
    ) -> Result<(), RenderError> {
        if self.state.is_some() {
            let err = RenderError::Internal("light tiler is already initialized".to_owned());
            log::error!("{err}");
            return Err(err);
        }

        let (width, height) = device.backbuffer_size();
        let grid = TileGrid::new(width, height, self.config.tile_resolution);
        let per_tile = u64::from(self.config.max_num_lights_per_tile(height));

        // Keep at least one element so the buffer can be bound.
        let index_elements = (grid.tile_count() * per_tile).max(1);
        let light_elements = u64::from(self.config.max_lights).max(1);

        let light_index = device.create_texel_buffer(&TexelBufferDescriptor {
            label: Some(Cow::Borrowed("per-tile light indices")),
            size: index_elements * TexelFormat::R32Uint.element_size(),
            format: TexelFormat::R32Uint,
        })?;
        let point_lights = device.create_texel_buffer(&TexelBufferDescriptor {
            label: Some(Cow::Borrowed("point light centers and radii")),
            size: light_elements * TexelFormat::Rgba32Float.element_size(),
            format: TexelFormat::Rgba32Float,
        })?;
        let spot_lights = device.create_texel_buffer(&TexelBufferDescriptor {
            label: Some(Cow::Borrowed("spot light centers and radii")),
            size: light_elements * TexelFormat::Rgba32Float.element_size(),
            format: TexelFormat::Rgba32Float,
        })?;

        log::info!(
            "Light tiler initialized: {}x{} tiles, {} lights per tile.",
            grid.tiles_x,
            grid.tiles_y,
            per_tile
        );

        self.state = Some(InitState {
            height,
            grid,
            buffers: LightTilerBuffers {
                light_index,
                point_lights,
                spot_lights,
            },
        });
        Ok(())
    }

    /// Returns `true` between [`init`](Self::init) and [`destroy_objects`](Self::destroy_objects).
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Stores a point light. Out-of-range indices are dropped.
    pub fn set_point_light_position_and_radius(
        &mut self,
        index: usize,
        position: Vec3,
        radius: f32,
    ) {
        if self.state.is_none() {
            log::warn!("Point light {index} written before the light tiler was initialized.");
        }
        write_light(&mut self.point_lights, &mut self.active_point_lights, index, position, radius);
    }

    /// Stores a spot light. Out-of-range indices are dropped.
    pub fn set_spot_light_position_and_radius(
        &mut self,
        index: usize,
        position: Vec3,
        radius: f32,
    ) {
        if self.state.is_none() {
            log::warn!("Spot light {index} written before the light tiler was initialized.");
        }
        write_light(&mut self.spot_lights, &mut self.active_spot_lights, index, position, radius);
    }

    /// Uploads the written part of both registries. Does nothing before init.
    pub fn update_light_buffers<B: GraphicsBackend>(
        &self,
        device: &mut GraphicsDevice<B>,
    ) -> Result<(), ResourceError> {
        let Some(state) = self.state else {
            return Ok(());
        };

        let point = &self.point_lights[..self.active_point_lights as usize];
        if !point.is_empty() {
            device.write_texel_buffer(state.buffers.point_lights, 0, bytemuck::cast_slice(point))?;
        }
        let spot = &self.spot_lights[..self.active_spot_lights as usize];
        if !spot.is_empty() {
            device.write_texel_buffer(state.buffers.spot_lights, 0, bytemuck::cast_slice(spot))?;
        }
        Ok(())
    }

    /// Fills the per-object block for the culling kernel, uploads it and
    /// describes the dispatch. Recording the dispatch is up to the caller.
    ///
    /// # Errors
    /// Returns `RenderError::Internal` before init or if `projection` is not invertible.
    pub fn cull_lights<B: GraphicsBackend>(
        &self,
        device: &mut GraphicsDevice<B>,
        shader: &ComputeShader,
        projection: &Mat4,
        local_to_view: &Mat4,
        depth_normal_target: &RenderTexture,
    ) -> Result<LightCullingDispatch, RenderError> {
        let Some(state) = self.state else {
            let err = RenderError::Internal("light tiler is not initialized".to_owned());
            log::error!("{err}");
            return Err(err);
        };
        let Some(clip_to_view) = projection.inverse() else {
            let err =
                RenderError::Internal("light culling projection is not invertible".to_owned());
            log::error!("{err}");
            return Err(err);
        };

        let uniforms = device.per_object_uniforms_mut();
        uniforms.clip_to_view = clip_to_view;
        uniforms.local_to_view = *local_to_view;
        uniforms.window_width = depth_normal_target.width as i32;
        uniforms.window_height = depth_normal_target.height as i32;
        uniforms.num_lights =
            PerObjectUniforms::pack_light_counts(self.active_point_lights, self.active_spot_lights);
        uniforms.max_num_lights_per_tile = self.config.max_num_lights_per_tile(state.height);
        device.upload_per_object_uniforms()?;

        Ok(LightCullingDispatch {
            shader: shader.id,
            groups: [state.grid.tiles_x, state.grid.tiles_y, 1],
            buffers: state.buffers,
        })
    }

    /// Per-tile light capacity for the backbuffer captured at init.
    pub fn max_num_lights_per_tile(&self) -> u32 {
        self.config
            .max_num_lights_per_tile(self.state.map_or(0, |state| state.height))
    }

    /// Tiles along x, or 0 before init.
    pub fn num_tiles_x(&self) -> u32 {
        self.state.map_or(0, |state| state.grid.tiles_x)
    }

    /// Tiles along y, or 0 before init.
    pub fn num_tiles_y(&self) -> u32 {
        self.state.map_or(0, |state| state.grid.tiles_y)
    }

    /// The buffers, or `None` before init.
    pub fn buffers(&self) -> Option<LightTilerBuffers> {
        self.state.map(|state| state.buffers)
    }

    /// High-water mark of the point light registry.
    pub fn active_point_lights(&self) -> u32 {
        self.active_point_lights
    }

    /// High-water mark of the spot light registry.
    pub fn active_spot_lights(&self) -> u32 {
        self.active_spot_lights
    }

    /// Center (xyz) and radius (w) of a point light slot.
    pub fn point_light(&self, index: usize) -> Option<Vec4> {
        self.point_lights.get(index).copied()
    }

    /// Center (xyz) and radius (w) of a spot light slot.
    pub fn spot_light(&self, index: usize) -> Option<Vec4> {
        self.spot_lights.get(index).copied()
    }

    /// Releases the GPU buffers. The registries are kept.
    pub fn destroy_objects<B: GraphicsBackend>(
        &mut self,
        device: &mut GraphicsDevice<B>,
    ) -> Result<(), ResourceError> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        device.destroy_texel_buffer(state.buffers.light_index)?;
        device.destroy_texel_buffer(state.buffers.point_lights)?;
        device.destroy_texel_buffer(state.buffers.spot_lights)?;
        log::info!("Light tiler buffers released.");
        Ok(())
    }
}

fn write_light(lights: &mut [Vec4], mark: &mut u32, index: usize, position: Vec3, radius: f32) {
    debug_assert!(
        index < lights.len(),
        "light index {index} out of range (capacity {})",
        lights.len()
    );
    let Some(slot) = lights.get_mut(index) else {
        return;
    };
    *slot = Vec4::from_vec3(position, radius);
    *mark = (*mark).max(index as u32 + 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_hd_tile_grid() {
        let grid = TileGrid::new(1920, 1080, 16);
        assert_eq!((grid.tiles_x, grid.tiles_y), (120, 68));
        assert_eq!(grid.tile_count(), 8160);
    }

    #[test]
    fn lights_per_tile_shrink_with_height() {
        let config = LightTilerConfig::default();
        assert_eq!(config.max_num_lights_per_tile(720), 544 - 32 * 6);
        assert_eq!(config.max_num_lights_per_tile(1080), 544 - 32 * 9);
        assert_eq!(config.max_num_lights_per_tile(4320), 544 - 32 * 9);
    }

    #[test]
    fn lights_per_tile_saturate_at_zero() {
        let config = LightTilerConfig {
            max_lights_per_tile: 64,
            ..LightTilerConfig::default()
        };
        assert_eq!(config.max_num_lights_per_tile(1080), 0);
    }

    #[test]
    fn high_water_mark_never_decreases() {
        let mut tiler = LightTiler::new(LightTilerConfig {
            max_lights: 8,
            ..LightTilerConfig::default()
        });
        tiler.set_point_light_position_and_radius(5, Vec3::X, 2.0);
        tiler.set_point_light_position_and_radius(2, Vec3::Y, 1.0);
        assert_eq!(tiler.active_point_lights(), 6);
        assert_eq!(tiler.active_spot_lights(), 0);
        assert_eq!(tiler.point_light(5), Some(Vec4::new(1.0, 0.0, 0.0, 2.0)));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn out_of_range_light_asserts_in_debug() {
        let mut tiler = LightTiler::new(LightTilerConfig {
            max_lights: 4,
            ..LightTilerConfig::default()
        });
        tiler.set_spot_light_position_and_radius(4, Vec3::ZERO, 1.0);
    }

    #[test]
    fn config_defaults_from_partial_json() {
        let config: LightTilerConfig =
            serde_json::from_str(r#"{ "tile_resolution": 32 }"#).unwrap();
        assert_eq!(config.tile_resolution, 32);
        assert_eq!(config.max_lights_per_tile, 544);
    }
}
