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

//! A backend that performs no GPU work.
//!
//! Every call is validated the way a native backend would validate it and then
//! appended to an in-memory log, which makes the backend suitable for servers,
//! CI machines and for asserting the exact order of calls a frame produces.

use lumen_core::math::{Mat4, Vec3};
use lumen_core::renderer::api::*;
use lumen_core::renderer::{GraphicsBackend, PipelineError, RenderError, ResourceError};
use std::collections::HashMap;

/// One call received by a [`HeadlessBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    /// A pipeline state object was created.
    CreatePipelineState(PipelineStateId),
    /// A pipeline state object was destroyed.
    DestroyPipelineState(PipelineStateId),
    /// The backbuffer changed resource state.
    Transition {
        /// State before the transition.
        from: BackbufferState,
        /// State after the transition.
        to: BackbufferState,
    },
    /// The viewport and scissor were set.
    ViewportAndScissor(u32, u32),
    /// The backbuffer was cleared and bound.
    ClearAndBind([f32; 4]),
    /// A shader program became current.
    UseShader(Option<String>),
    /// An integer parameter was set.
    SetInt(String, i32),
    /// A float parameter was set.
    SetFloat(String, f32),
    /// A vector parameter was set.
    SetVector3(String, Vec3),
    /// A matrix array parameter was set.
    SetMatrixArray(String, usize),
    /// A texture was bound.
    SetTexture(String, TextureBinding, u32),
    /// Depth bias was toggled.
    PolygonOffset(bool, f32, f32),
    /// The per-object block was uploaded.
    UploadUniforms,
    /// An indexed draw was recorded.
    Draw(PipelineStateId, DrawCommand),
    /// Recorded work was submitted.
    Submit(FenceValue),
    /// The backbuffer was presented.
    Present,
    /// The CPU waited on a fence.
    WaitForFence(FenceValue),
    /// Command recording was reset.
    ResetCommandRecording,
    /// A texel buffer was created.
    CreateTexelBuffer(GpuBufferId),
    /// A texel buffer was written.
    WriteTexelBuffer(GpuBufferId, u64, usize),
    /// A texel buffer was destroyed.
    DestroyTexelBuffer(GpuBufferId),
    /// The device was released.
    ReleaseDevice,
}

/// A [`GraphicsBackend`] that keeps every resource in host memory.
#[derive(Debug)]
pub struct HeadlessBackend {
    width: u32,
    height: u32,
    calls: Vec<BackendCall>,
    pipelines: HashMap<PipelineStateId, PipelineStateDescriptor>,
    next_pipeline_id: usize,
    buffers: HashMap<GpuBufferId, Vec<u8>>,
    next_buffer_id: usize,
    next_fence: u64,
    completed_fence: FenceValue,
    last_uniforms: Option<PerObjectUniforms>,
    released: bool,
}

impl HeadlessBackend {
    /// Creates a backend whose backbuffer is `width` x `height` pixels.
    pub fn new(width: u32, height: u32) -> Self {
        log::info!("Headless graphics backend created ({width}x{height}).");
        Self {
            width,
            height,
            calls: Vec::new(),
            pipelines: HashMap::new(),
            next_pipeline_id: 0,
            buffers: HashMap::new(),
            next_buffer_id: 0,
            next_fence: 0,
            completed_fence: FenceValue::default(),
            last_uniforms: None,
            released: false,
        }
    }

    /// Every call received so far, oldest first.
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    /// Drains the call log.
    pub fn take_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    /// Number of pipeline state objects currently alive.
    pub fn live_pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Number of texel buffers currently alive.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Returns the contents of a live texel buffer.
    pub fn buffer_contents(&self, id: GpuBufferId) -> Option<&[u8]> {
        self.buffers.get(&id).map(Vec::as_slice)
    }

    /// The last per-object block uploaded.
    pub fn last_uniforms(&self) -> Option<&PerObjectUniforms> {
        self.last_uniforms.as_ref()
    }

    /// The highest fence value the backend has waited on.
    pub fn completed_fence(&self) -> FenceValue {
        self.completed_fence
    }

    /// Whether [`GraphicsBackend::release_device`] has been called.
    pub fn is_released(&self) -> bool {
        self.released
    }

    fn record(&mut self, call: BackendCall) {
        log::trace!("headless: {call:?}");
        self.calls.push(call);
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn backbuffer_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn create_pipeline_state(
        &mut self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<PipelineStateId, PipelineError> {
        let id = PipelineStateId(self.next_pipeline_id);
        self.next_pipeline_id += 1;
        self.pipelines.insert(id, descriptor.clone());
        self.record(BackendCall::CreatePipelineState(id));
        Ok(id)
    }

    fn destroy_pipeline_state(&mut self, id: PipelineStateId) -> Result<(), ResourceError> {
        self.pipelines
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        self.record(BackendCall::DestroyPipelineState(id));
        Ok(())
    }

    fn transition_backbuffer(&mut self, from: BackbufferState, to: BackbufferState) {
        self.record(BackendCall::Transition { from, to });
    }

    fn set_viewport_and_scissor(&mut self, width: u32, height: u32) {
        self.record(BackendCall::ViewportAndScissor(width, height));
    }

    fn clear_and_bind_backbuffer(&mut self, color: [f32; 4], _depth: f32) {
        self.record(BackendCall::ClearAndBind(color));
    }

    fn use_shader(&mut self, program: &ShaderProgram) {
        let label = program.label.as_deref().map(str::to_owned);
        self.record(BackendCall::UseShader(label));
    }

    fn set_int(&mut self, name: &str, value: i32) {
        self.record(BackendCall::SetInt(name.to_owned(), value));
    }

    fn set_float(&mut self, name: &str, value: f32) {
        self.record(BackendCall::SetFloat(name.to_owned(), value));
    }

    fn set_vector3(&mut self, name: &str, value: Vec3) {
        self.record(BackendCall::SetVector3(name.to_owned(), value));
    }

    fn set_matrix_array(&mut self, name: &str, matrices: &[Mat4]) {
        self.record(BackendCall::SetMatrixArray(name.to_owned(), matrices.len()));
    }

    fn set_texture(&mut self, name: &str, texture: TextureBinding, unit: u32) {
        self.record(BackendCall::SetTexture(name.to_owned(), texture, unit));
    }

    fn set_polygon_offset(&mut self, enabled: bool, factor: f32, units: f32) {
        self.record(BackendCall::PolygonOffset(enabled, factor, units));
    }

    fn upload_per_object_uniforms(
        &mut self,
        uniforms: &PerObjectUniforms,
    ) -> Result<(), RenderError> {
        self.last_uniforms = Some(*uniforms);
        self.record(BackendCall::UploadUniforms);
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        pipeline: PipelineStateId,
        command: &DrawCommand,
    ) -> Result<(), RenderError> {
        if !self.pipelines.contains_key(&pipeline) {
            return Err(PipelineError::InvalidPipelineState { id: pipeline }.into());
        }
        self.record(BackendCall::Draw(pipeline, *command));
        Ok(())
    }

    fn submit(&mut self) -> Result<FenceValue, RenderError> {
        self.next_fence += 1;
        let fence = FenceValue(self.next_fence);
        self.record(BackendCall::Submit(fence));
        Ok(fence)
    }

    fn present(&mut self) -> Result<(), RenderError> {
        if self.released {
            return Err(RenderError::DeviceLost);
        }
        self.record(BackendCall::Present);
        Ok(())
    }

    fn wait_for_fence(&mut self, fence: FenceValue) -> Result<(), RenderError> {
        if fence.0 > self.next_fence {
            return Err(RenderError::Internal(format!(
                "Waiting on fence {} that was never submitted",
                fence.0
            )));
        }
        self.completed_fence = self.completed_fence.max(fence);
        self.record(BackendCall::WaitForFence(fence));
        Ok(())
    }

    fn reset_command_recording(&mut self) {
        self.record(BackendCall::ResetCommandRecording);
    }

    fn create_texel_buffer(
        &mut self,
        descriptor: &TexelBufferDescriptor,
    ) -> Result<GpuBufferId, ResourceError> {
        let size = usize::try_from(descriptor.size).map_err(|_| {
            ResourceError::BackendError(format!(
                "Texel buffer {:?} is too large for host memory",
                descriptor.label
            ))
        })?;
        let id = GpuBufferId(self.next_buffer_id);
        self.next_buffer_id += 1;
        self.buffers.insert(id, vec![0; size]);
        self.record(BackendCall::CreateTexelBuffer(id));
        Ok(id)
    }

    fn write_texel_buffer(
        &mut self,
        id: GpuBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        let buffer = self.buffers.get_mut(&id).ok_or(ResourceError::NotFound)?;
        let start = usize::try_from(offset).map_err(|_| ResourceError::OutOfBounds)?;
        let end = start
            .checked_add(data.len())
            .ok_or(ResourceError::OutOfBounds)?;
        let target = buffer
            .get_mut(start..end)
            .ok_or(ResourceError::OutOfBounds)?;
        target.copy_from_slice(data);
        self.record(BackendCall::WriteTexelBuffer(id, offset, data.len()));
        Ok(())
    }

    fn destroy_texel_buffer(&mut self, id: GpuBufferId) -> Result<(), ResourceError> {
        self.buffers.remove(&id).ok_or(ResourceError::NotFound)?;
        self.record(BackendCall::DestroyTexelBuffer(id));
        Ok(())
    }

    fn release_device(&mut self) {
        if !self.pipelines.is_empty() || !self.buffers.is_empty() {
            log::warn!(
                "Headless device released with {} pipelines and {} buffers alive",
                self.pipelines.len(),
                self.buffers.len()
            );
        }
        self.released = true;
        self.record(BackendCall::ReleaseDevice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_outside_buffer_is_rejected() {
        let mut backend = HeadlessBackend::new(64, 64);
        let id = backend
            .create_texel_buffer(&TexelBufferDescriptor {
                label: None,
                size: 8,
                format: TexelFormat::R32Uint,
            })
            .unwrap();
        assert!(backend.write_texel_buffer(id, 4, &[1, 2, 3, 4]).is_ok());
        assert!(matches!(
            backend.write_texel_buffer(id, 6, &[1, 2, 3, 4]),
            Err(ResourceError::OutOfBounds)
        ));
        assert_eq!(backend.buffer_contents(id).unwrap(), &[0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn draw_with_unknown_pipeline_fails() {
        let mut backend = HeadlessBackend::default();
        let command = DrawCommand {
            vertex_buffer: VertexBufferId(0),
            start_face: 0,
            face_count: 1,
            raster: RasterState::default(),
        };
        assert!(backend.draw_indexed(PipelineStateId(3), &command).is_err());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn fences_increase_and_complete_in_order() {
        let mut backend = HeadlessBackend::default();
        let first = backend.submit().unwrap();
        let second = backend.submit().unwrap();
        assert!(second > first);
        backend.wait_for_fence(second).unwrap();
        assert_eq!(backend.completed_fence(), second);
        assert!(backend.wait_for_fence(FenceValue(99)).is_err());
    }

    #[test]
    fn destroying_unknown_resources_reports_not_found() {
        let mut backend = HeadlessBackend::default();
        assert!(matches!(
            backend.destroy_pipeline_state(PipelineStateId(0)),
            Err(ResourceError::NotFound)
        ));
        assert!(matches!(
            backend.destroy_texel_buffer(GpuBufferId(0)),
            Err(ResourceError::NotFound)
        ));
    }
}
