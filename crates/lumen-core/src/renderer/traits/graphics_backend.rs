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

use crate::math::{Mat4, Vec3};
use crate::renderer::api::*;
use crate::renderer::error::{PipelineError, RenderError, ResourceError};
use std::fmt::Debug;

/// The contract every native graphics API implementation fulfils.
///
/// A backend is exclusively owned by one [`GraphicsDevice`](crate::renderer::GraphicsDevice),
/// which calls it from a single thread and handles every piece of
/// backend-independent state (pipeline cache, counters, fences). Backends
/// only translate calls into native API work.
pub trait GraphicsBackend: Send + Debug + 'static {
    /// Returns the current backbuffer dimensions in pixels.
    fn backbuffer_size(&self) -> (u32, u32);

    /// Returns the matrix that maps shadow clip space to shadow-map texture space.
    ///
    /// Backends whose clip space already matches texture space return `None`.
    fn shadow_clip_bias(&self) -> Option<Mat4> {
        Some(Mat4::CLIP_TO_TEXTURE_BIAS)
    }

    /// Compiles a pipeline state object.
    /// ## Arguments
    /// * `descriptor` - The cache key and the raster state of the triggering draw.
    /// ## Errors
    /// * `PipelineError` - If the backend fails to compile the pipeline state.
    fn create_pipeline_state(
        &mut self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<PipelineStateId, PipelineError>;

    /// Destroys a pipeline state object.
    /// ## Errors
    /// * `ResourceError` - If the ID is unknown to the backend.
    fn destroy_pipeline_state(&mut self, id: PipelineStateId) -> Result<(), ResourceError>;

    /// Records a resource-state transition of the backbuffer.
    fn transition_backbuffer(&mut self, from: BackbufferState, to: BackbufferState);

    /// Sets the viewport and the scissor rectangle.
    fn set_viewport_and_scissor(&mut self, width: u32, height: u32);

    /// Clears the backbuffer color and depth and binds them as the active target.
    fn clear_and_bind_backbuffer(&mut self, color: [f32; 4], depth: f32);

    /// Makes `program` the target of the following parameter writes and draws.
    fn use_shader(&mut self, program: &ShaderProgram);

    /// Sets an integer shader parameter.
    fn set_int(&mut self, name: &str, value: i32);

    /// Sets a float shader parameter.
    fn set_float(&mut self, name: &str, value: f32);

    /// Sets a 3-component vector shader parameter.
    fn set_vector3(&mut self, name: &str, value: Vec3);

    /// Sets a matrix array shader parameter.
    fn set_matrix_array(&mut self, name: &str, matrices: &[Mat4]);

    /// Binds a texture to a named parameter and a texture unit.
    fn set_texture(&mut self, name: &str, texture: TextureBinding, unit: u32);

    /// Enables or disables depth bias for the following draws.
    fn set_polygon_offset(&mut self, enabled: bool, factor: f32, units: f32);

    /// Makes `uniforms` the per-object block seen by the next draw or dispatch.
    /// ## Errors
    /// * `RenderError` - If the backend cannot stage the block.
    fn upload_per_object_uniforms(
        &mut self,
        uniforms: &PerObjectUniforms,
    ) -> Result<(), RenderError>;

    /// Records one indexed draw with a previously created pipeline state.
    /// ## Errors
    /// * `RenderError` - If the pipeline state or vertex buffer is unknown.
    fn draw_indexed(
        &mut self,
        pipeline: PipelineStateId,
        command: &DrawCommand,
    ) -> Result<(), RenderError>;

    /// Closes and submits the recorded commands and returns the fence value
    /// that will be signalled when they complete.
    fn submit(&mut self) -> Result<FenceValue, RenderError>;

    /// Requests the platform to present the backbuffer.
    /// ## Errors
    /// * `RenderError::DeviceLost` / `RenderError::DeviceReset` - If the device went away.
    /// * `RenderError::RenderingFailed` - For any other present failure.
    fn present(&mut self) -> Result<(), RenderError>;

    /// Blocks until `fence` is signalled. There is no timeout.
    fn wait_for_fence(&mut self, fence: FenceValue) -> Result<(), RenderError>;

    /// Resets command recording for the next frame.
    fn reset_command_recording(&mut self);

    /// Creates a texel buffer.
    fn create_texel_buffer(
        &mut self,
        descriptor: &TexelBufferDescriptor,
    ) -> Result<GpuBufferId, ResourceError>;

    /// Writes `data` into a texel buffer at a byte offset.
    /// ## Errors
    /// * `ResourceError::OutOfBounds` - If the write does not fit in the buffer.
    fn write_texel_buffer(
        &mut self,
        id: GpuBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError>;

    /// Destroys a texel buffer.
    fn destroy_texel_buffer(&mut self, id: GpuBufferId) -> Result<(), ResourceError>;

    /// Releases the device, the swapchain and every descriptor pool.
    ///
    /// Called once, after every pipeline state and buffer has been destroyed.
    fn release_device(&mut self);
}
