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

//! The backend-independent graphics device frontend.
//!
//! [`GraphicsDevice`] owns everything that does not depend on the native API:
//! the pipeline-state cache, the per-frame counters, the per-object uniform
//! block, the backbuffer state machine and the one-frame-in-flight fence. It
//! drives a [`GraphicsBackend`] for the actual GPU work.

use crate::math::{Mat4, Vec3};
use crate::renderer::api::*;
use crate::renderer::error::{PipelineError, RenderError, ResourceError, ShaderError};
use crate::renderer::traits::GraphicsBackend;
use std::collections::HashMap;

/// Depth value the backbuffer is cleared to.
const CLEAR_DEPTH: f32 = 1.0;

/// Tracks the single frame allowed in flight.
#[derive(Debug, Default)]
pub struct FrameFence {
    in_flight: Option<FenceValue>,
    last_completed: Option<FenceValue>,
}

impl FrameFence {
    /// Records `value` as the fence of the frame just submitted.
    ///
    /// # Errors
    /// Returns `RenderError::Internal` if a frame is already in flight.
    pub fn signal(&mut self, value: FenceValue) -> Result<(), RenderError> {
        if let Some(pending) = self.in_flight {
            return Err(RenderError::Internal(format!(
                "fence {value:?} signalled while {pending:?} is still in flight"
            )));
        }
        self.in_flight = Some(value);
        Ok(())
    }

    /// Returns the fence of the frame in flight, if any.
    pub fn in_flight(&self) -> Option<FenceValue> {
        self.in_flight
    }

    /// Marks the frame in flight as complete and returns its fence.
    pub fn complete(&mut self) -> Option<FenceValue> {
        let completed = self.in_flight.take();
        if completed.is_some() {
            self.last_completed = completed;
        }
        completed
    }

    /// Returns the fence of the last frame known to be complete.
    pub fn last_completed(&self) -> Option<FenceValue> {
        self.last_completed
    }
}

/// The backend-agnostic graphics device.
#[derive(Debug)]
pub struct GraphicsDevice<B: GraphicsBackend> {
    backend: B,
    pipeline_cache: HashMap<PipelineStateKey, PipelineStateId>,
    statistics: FrameStatistics,
    per_object: PerObjectUniforms,
    clear_color: [f32; 3],
    backbuffer_state: BackbufferState,
    fence: FrameFence,
    texel_buffers: Vec<GpuBufferId>,
    released: bool,
}

impl<B: GraphicsBackend> GraphicsDevice<B> {
    /// Wraps a backend in a new device.
    pub fn new(backend: B) -> Self {
        let (width, height) = backend.backbuffer_size();
        log::info!("Graphics device created ({width}x{height} backbuffer).");
        Self {
            backend,
            pipeline_cache: HashMap::new(),
            statistics: FrameStatistics::default(),
            per_object: PerObjectUniforms::default(),
            clear_color: [0.0; 3],
            backbuffer_state: BackbufferState::Present,
            fence: FrameFence::default(),
            texel_buffers: Vec::new(),
            released: false,
        }
    }

    /// Returns the wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the wrapped backend mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Returns the backbuffer dimensions in pixels.
    pub fn backbuffer_size(&self) -> (u32, u32) {
        self.backend.backbuffer_size()
    }

    /// Returns the current backbuffer state.
    pub fn backbuffer_state(&self) -> BackbufferState {
        self.backbuffer_state
    }

    /// Returns the backend's clip-to-shadow-texture bias, if it needs one.
    pub fn shadow_clip_bias(&self) -> Option<Mat4> {
        self.backend.shadow_clip_bias()
    }

    /// Sets the color used by [`clear_screen`](Self::clear_screen).
    pub fn set_clear_color(&mut self, r: f32, g: f32, b: f32) {
        self.clear_color = [r, g, b];
    }

    /// Returns the counters of the frame being recorded.
    pub fn frame_statistics(&self) -> FrameStatistics {
        self.statistics
    }

    /// Zeroes the per-frame counters and advances the frame index.
    ///
    /// Call once per frame, before any draws.
    pub fn reset_frame_statistics(&mut self) {
        self.statistics.begin_frame();
    }

    /// Counts one draw call.
    pub fn increment_draw_calls(&mut self) {
        self.statistics.draw_calls += 1;
    }

    /// Counts one texture bind.
    pub fn increment_texture_binds(&mut self) {
        self.statistics.texture_binds += 1;
    }

    /// Counts one vertex buffer bind.
    pub fn increment_vertex_buffer_binds(&mut self) {
        self.statistics.vertex_buffer_binds += 1;
    }

    /// Number of pipeline states created so far.
    pub fn pipeline_cache_len(&self) -> usize {
        self.pipeline_cache.len()
    }

    /// Returns the per-object uniform block for editing before a draw.
    pub fn per_object_uniforms_mut(&mut self) -> &mut PerObjectUniforms {
        &mut self.per_object
    }

    /// Returns the per-object uniform block.
    pub fn per_object_uniforms(&self) -> &PerObjectUniforms {
        &self.per_object
    }

    /// Hands the current per-object uniform block to the backend.
    ///
    /// # Errors
    /// Returns the backend's error if the block could not be staged.
    pub fn upload_per_object_uniforms(&mut self) -> Result<(), RenderError> {
        self.backend
            .upload_per_object_uniforms(&self.per_object)
            .map_err(|err| {
                log::error!("Per-object uniform upload failed: {err}");
                err
            })
    }

    /// Makes `program` the target of the following parameter writes.
    pub fn use_shader(&mut self, program: &ShaderProgram) {
        self.backend.use_shader(program);
    }

    /// Sets an integer shader parameter.
    pub fn set_int(&mut self, name: &str, value: i32) {
        self.backend.set_int(name, value);
    }

    /// Sets a float shader parameter.
    pub fn set_float(&mut self, name: &str, value: f32) {
        self.backend.set_float(name, value);
    }

    /// Sets a vector shader parameter.
    pub fn set_vector3(&mut self, name: &str, value: Vec3) {
        self.backend.set_vector3(name, value);
    }

    /// Sets a matrix array shader parameter.
    pub fn set_matrix_array(&mut self, name: &str, matrices: &[Mat4]) {
        self.backend.set_matrix_array(name, matrices);
    }

    /// Binds a texture to a parameter and unit, counting a bind unless the
    /// binding is the empty sentinel.
    pub fn set_texture(&mut self, name: &str, texture: TextureBinding, unit: u32) {
        if texture.is_bound() {
            self.increment_texture_binds();
        }
        self.backend.set_texture(name, texture, unit);
    }

    /// Enables or disables depth bias for the following draws.
    pub fn set_polygon_offset(&mut self, enabled: bool, factor: f32, units: f32) {
        self.backend.set_polygon_offset(enabled, factor, units);
    }

    /// Issues one indexed draw of `face_count` triangles starting at `start_face`.
    ///
    /// The pipeline state for `(vertex_buffer, shader stages, blend_mode,
    /// depth_func)` is created on first use and reused afterwards. The
    /// per-object uniform block is uploaded before the draw.
    ///
    /// # Errors
    /// Returns a `PipelineError` if `shader` is not a valid program or the
    /// backend fails to compile the pipeline state, and any error the backend
    /// reports for the draw itself.
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &mut self,
        vertex_buffer: VertexBufferId,
        start_face: u32,
        face_count: u32,
        shader: &ShaderProgram,
        blend_mode: BlendMode,
        depth_func: DepthFunc,
        cull_mode: CullMode,
        fill_mode: FillMode,
        topology: PrimitiveTopology,
    ) -> Result<(), RenderError> {
        let Some((vertex_stage, pixel_stage)) = shader.stages() else {
            let err = PipelineError::from(ShaderError::InvalidProgram {
                label: shader.label.as_deref().unwrap_or("Unknown").to_owned(),
            });
            log::error!("{err}");
            return Err(err.into());
        };

        let key = PipelineStateKey {
            vertex_buffer,
            vertex_stage,
            pixel_stage,
            blend_mode,
            depth_func,
        };
        let raster = RasterState {
            cull_mode,
            fill_mode,
            topology,
        };

        let pipeline = match self.pipeline_cache.get(&key) {
            Some(&id) => id,
            None => {
                let descriptor = PipelineStateDescriptor {
                    label: shader.label.as_deref().map(str::to_owned),
                    key,
                    raster,
                };
                let id = self.backend.create_pipeline_state(&descriptor).map_err(|err| {
                    log::error!("Failed to create pipeline state: {err}");
                    err
                })?;
                log::debug!("Created pipeline state {id:?} for {key:?}");
                self.pipeline_cache.insert(key, id);
                id
            }
        };

        self.upload_per_object_uniforms()?;

        let command = DrawCommand {
            vertex_buffer,
            start_face,
            face_count,
            raster,
        };
        log::trace!("Draw {command:?} with {pipeline:?}");
        self.backend.draw_indexed(pipeline, &command)?;

        self.increment_draw_calls();
        self.increment_vertex_buffer_binds();
        Ok(())
    }

    /// Clears the backbuffer and binds it as the render target.
    ///
    /// Empty flags make this a no-op. Any other combination clears both
    /// color and depth.
    pub fn clear_screen(&mut self, flags: ClearFlags) {
        if flags.is_empty() {
            return;
        }

        if self.backbuffer_state == BackbufferState::Present {
            self.backend
                .transition_backbuffer(BackbufferState::Present, BackbufferState::RenderTarget);
            self.backbuffer_state = BackbufferState::RenderTarget;
        }

        let (width, height) = self.backend.backbuffer_size();
        self.backend.set_viewport_and_scissor(width, height);

        let [r, g, b] = self.clear_color;
        self.backend.clear_and_bind_backbuffer([r, g, b, 1.0], CLEAR_DEPTH);
    }

    /// Submits the frame, presents it and waits for the GPU to finish it.
    ///
    /// # Errors
    /// Any submit or present failure is fatal and is returned after being
    /// logged: `RenderError::DeviceLost`, `RenderError::DeviceReset` or
    /// `RenderError::RenderingFailed`.
    pub fn present(&mut self) -> Result<(), RenderError> {
        if self.backbuffer_state == BackbufferState::RenderTarget {
            self.backend
                .transition_backbuffer(BackbufferState::RenderTarget, BackbufferState::Present);
            self.backbuffer_state = BackbufferState::Present;
        }

        let fence = self.backend.submit().map_err(|err| {
            log::error!("Command submission failed: {err}");
            err
        })?;
        self.fence.signal(fence)?;

        if let Err(err) = self.backend.present() {
            log::error!("Present failed: {err}");
            return Err(err);
        }

        self.backend.wait_for_fence(fence).map_err(|err| {
            log::error!("Waiting for frame fence {fence:?} failed: {err}");
            err
        })?;
        self.fence.complete();

        self.backend.reset_command_recording();
        Ok(())
    }

    /// Returns the fence tracker.
    pub fn frame_fence(&self) -> &FrameFence {
        &self.fence
    }

    /// Creates a texel buffer owned by the device until destroyed or released.
    pub fn create_texel_buffer(
        &mut self,
        descriptor: &TexelBufferDescriptor,
    ) -> Result<GpuBufferId, ResourceError> {
        let id = self.backend.create_texel_buffer(descriptor)?;
        log::debug!(
            "Created texel buffer {id:?} '{}' ({} bytes, {:?})",
            descriptor.label.as_deref().unwrap_or("unlabeled"),
            descriptor.size,
            descriptor.format
        );
        self.texel_buffers.push(id);
        Ok(id)
    }

    /// Writes bytes into a texel buffer.
    pub fn write_texel_buffer(
        &mut self,
        id: GpuBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        self.backend.write_texel_buffer(id, offset, data)
    }

    /// Destroys a texel buffer created through this device.
    pub fn destroy_texel_buffer(&mut self, id: GpuBufferId) -> Result<(), ResourceError> {
        let Some(position) = self.texel_buffers.iter().position(|&b| b == id) else {
            return Err(ResourceError::NotFound);
        };
        self.texel_buffers.swap_remove(position);
        self.backend.destroy_texel_buffer(id)
    }

    /// Releases every GPU object owned by the device.
    ///
    /// Cached pipeline states go first, then buffers, then the device itself.
    /// Calling this again is a no-op.
    pub fn release_gpu_objects(&mut self) {
        if self.released {
            log::warn!("GPU objects already released; ignoring.");
            return;
        }

        let mut pipelines: Vec<_> = self.pipeline_cache.drain().map(|(_, id)| id).collect();
        pipelines.sort();
        for id in pipelines {
            if let Err(err) = self.backend.destroy_pipeline_state(id) {
                log::warn!("Failed to destroy pipeline state {id:?}: {err}");
            }
        }

        for id in std::mem::take(&mut self.texel_buffers) {
            if let Err(err) = self.backend.destroy_texel_buffer(id) {
                log::warn!("Failed to destroy texel buffer {id:?}: {err}");
            }
        }

        self.backend.release_device();
        self.released = true;
        log::info!("Graphics device released.");
    }

    /// Returns `true` once [`release_gpu_objects`](Self::release_gpu_objects) has run.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_allows_one_frame_in_flight() {
        let mut fence = FrameFence::default();
        fence.signal(FenceValue(1)).unwrap();
        assert!(fence.signal(FenceValue(2)).is_err());
        assert_eq!(fence.complete(), Some(FenceValue(1)));
        assert_eq!(fence.last_completed(), Some(FenceValue(1)));
        assert_eq!(fence.in_flight(), None);
        fence.signal(FenceValue(2)).unwrap();
        assert_eq!(fence.in_flight(), Some(FenceValue(2)));
    }

    #[test]
    fn completing_without_a_frame_keeps_history() {
        let mut fence = FrameFence::default();
        fence.signal(FenceValue(3)).unwrap();
        fence.complete();
        assert_eq!(fence.complete(), None);
        assert_eq!(fence.last_completed(), Some(FenceValue(3)));
    }
}
