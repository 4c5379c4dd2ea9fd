#![allow(dead_code)]

use lumen_core::math::{Mat4, Vec3};
use lumen_core::renderer::*;

/// One backend call, as recorded by [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreatePipelineState(PipelineStateDescriptor),
    DestroyPipelineState(PipelineStateId),
    Transition(BackbufferState, BackbufferState),
    ViewportAndScissor(u32, u32),
    ClearAndBind([f32; 4], f32),
    UseShader(Option<String>),
    SetInt(String, i32),
    SetFloat(String, f32),
    SetVector3(String, Vec3),
    SetMatrixArray(String, Vec<Mat4>),
    SetTexture(String, TextureBinding, u32),
    SetPolygonOffset(bool, f32, f32),
    UploadUniforms(PerObjectUniforms),
    Draw(PipelineStateId, DrawCommand),
    Submit(FenceValue),
    Present,
    WaitForFence(FenceValue),
    ResetRecording,
    CreateBuffer(GpuBufferId, TexelBufferDescriptor),
    WriteBuffer(GpuBufferId, u64, Vec<u8>),
    DestroyBuffer(GpuBufferId),
    ReleaseDevice,
}

#[derive(Debug)]
pub struct MockBackend {
    pub calls: Vec<Call>,
    pub size: (u32, u32),
    pub fail_present: bool,
    pub fail_upload: bool,
    next_pipeline: usize,
    next_buffer: usize,
    next_fence: u64,
}

impl MockBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            calls: Vec::new(),
            size: (width, height),
            fail_present: false,
            fail_upload: false,
            next_pipeline: 0,
            next_buffer: 0,
            next_fence: 0,
        }
    }

    pub fn pipeline_creations(&self) -> Vec<&PipelineStateDescriptor> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::CreatePipelineState(desc) => Some(desc),
                _ => None,
            })
            .collect()
    }

    pub fn draws(&self) -> Vec<(PipelineStateId, DrawCommand)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Draw(id, command) => Some((*id, *command)),
                _ => None,
            })
            .collect()
    }

    pub fn last_uploaded_uniforms(&self) -> Option<PerObjectUniforms> {
        self.calls.iter().rev().find_map(|call| match call {
            Call::UploadUniforms(uniforms) => Some(*uniforms),
            _ => None,
        })
    }
}

impl GraphicsBackend for MockBackend {
    fn backbuffer_size(&self) -> (u32, u32) {
        self.size
    }

    fn create_pipeline_state(
        &mut self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<PipelineStateId, PipelineError> {
        self.calls.push(Call::CreatePipelineState(descriptor.clone()));
        self.next_pipeline += 1;
        Ok(PipelineStateId(self.next_pipeline))
    }

    fn destroy_pipeline_state(&mut self, id: PipelineStateId) -> Result<(), ResourceError> {
        self.calls.push(Call::DestroyPipelineState(id));
        Ok(())
    }

    fn transition_backbuffer(&mut self, from: BackbufferState, to: BackbufferState) {
        self.calls.push(Call::Transition(from, to));
    }

    fn set_viewport_and_scissor(&mut self, width: u32, height: u32) {
        self.calls.push(Call::ViewportAndScissor(width, height));
    }

    fn clear_and_bind_backbuffer(&mut self, color: [f32; 4], depth: f32) {
        self.calls.push(Call::ClearAndBind(color, depth));
    }

    fn use_shader(&mut self, program: &ShaderProgram) {
        self.calls
            .push(Call::UseShader(program.label.as_deref().map(str::to_owned)));
    }

    fn set_int(&mut self, name: &str, value: i32) {
        self.calls.push(Call::SetInt(name.to_owned(), value));
    }

    fn set_float(&mut self, name: &str, value: f32) {
        self.calls.push(Call::SetFloat(name.to_owned(), value));
    }

    fn set_vector3(&mut self, name: &str, value: Vec3) {
        self.calls.push(Call::SetVector3(name.to_owned(), value));
    }

    fn set_matrix_array(&mut self, name: &str, matrices: &[Mat4]) {
        self.calls
            .push(Call::SetMatrixArray(name.to_owned(), matrices.to_vec()));
    }

    fn set_texture(&mut self, name: &str, texture: TextureBinding, unit: u32) {
        self.calls
            .push(Call::SetTexture(name.to_owned(), texture, unit));
    }

    fn set_polygon_offset(&mut self, enabled: bool, factor: f32, units: f32) {
        self.calls
            .push(Call::SetPolygonOffset(enabled, factor, units));
    }

    fn upload_per_object_uniforms(
        &mut self,
        uniforms: &PerObjectUniforms,
    ) -> Result<(), RenderError> {
        if self.fail_upload {
            return Err(RenderError::Internal("uniform ring full".to_string()));
        }
        self.calls.push(Call::UploadUniforms(*uniforms));
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        pipeline: PipelineStateId,
        command: &DrawCommand,
    ) -> Result<(), RenderError> {
        self.calls.push(Call::Draw(pipeline, *command));
        Ok(())
    }

    fn submit(&mut self) -> Result<FenceValue, RenderError> {
        self.next_fence += 1;
        let fence = FenceValue(self.next_fence);
        self.calls.push(Call::Submit(fence));
        Ok(fence)
    }

    fn present(&mut self) -> Result<(), RenderError> {
        if self.fail_present {
            return Err(RenderError::DeviceLost);
        }
        self.calls.push(Call::Present);
        Ok(())
    }

    fn wait_for_fence(&mut self, fence: FenceValue) -> Result<(), RenderError> {
        self.calls.push(Call::WaitForFence(fence));
        Ok(())
    }

    fn reset_command_recording(&mut self) {
        self.calls.push(Call::ResetRecording);
    }

    fn create_texel_buffer(
        &mut self,
        descriptor: &TexelBufferDescriptor,
    ) -> Result<GpuBufferId, ResourceError> {
        let id = GpuBufferId(self.next_buffer);
        self.next_buffer += 1;
        self.calls.push(Call::CreateBuffer(id, descriptor.clone()));
        Ok(id)
    }

    fn write_texel_buffer(
        &mut self,
        id: GpuBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        self.calls
            .push(Call::WriteBuffer(id, offset, data.to_vec()));
        Ok(())
    }

    fn destroy_texel_buffer(&mut self, id: GpuBufferId) -> Result<(), ResourceError> {
        self.calls.push(Call::DestroyBuffer(id));
        Ok(())
    }

    fn release_device(&mut self) {
        self.calls.push(Call::ReleaseDevice);
    }
}

pub fn device() -> GraphicsDevice<MockBackend> {
    GraphicsDevice::new(MockBackend::new(1920, 1080))
}

pub fn shader(label: &'static str, vertex: usize, pixel: usize) -> ShaderProgram {
    ShaderProgram::new(label, ShaderStageId(vertex), ShaderStageId(pixel))
}
