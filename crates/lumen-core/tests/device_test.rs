mod common;

use common::{device, shader, Call, MockBackend};
use lumen_core::renderer::*;

fn draw_default(
    device: &mut GraphicsDevice<MockBackend>,
    vertex_buffer: usize,
    program: &ShaderProgram,
    blend_mode: BlendMode,
    cull_mode: CullMode,
) -> Result<(), RenderError> {
    device.draw(
        VertexBufferId(vertex_buffer),
        0,
        12,
        program,
        blend_mode,
        DepthFunc::LessOrEqualWriteOn,
        cull_mode,
        FillMode::Solid,
        PrimitiveTopology::Triangles,
    )
}

#[test]
fn identical_keys_share_one_pipeline_state() {
    let mut device = device();
    let lit = shader("lit", 1, 2);

    draw_default(&mut device, 7, &lit, BlendMode::Off, CullMode::Back).unwrap();
    draw_default(&mut device, 7, &lit, BlendMode::Off, CullMode::Back).unwrap();
    assert_eq!(device.pipeline_cache_len(), 1);
    assert_eq!(device.backend().pipeline_creations().len(), 1);

    // Raster state is not part of the key.
    draw_default(&mut device, 7, &lit, BlendMode::Off, CullMode::Off).unwrap();
    assert_eq!(device.pipeline_cache_len(), 1);

    draw_default(&mut device, 7, &lit, BlendMode::AlphaBlend, CullMode::Back).unwrap();
    assert_eq!(device.pipeline_cache_len(), 2);

    draw_default(&mut device, 8, &lit, BlendMode::Off, CullMode::Back).unwrap();
    assert_eq!(device.pipeline_cache_len(), 3);

    draw_default(&mut device, 7, &shader("unlit", 1, 3), BlendMode::Off, CullMode::Back).unwrap();
    assert_eq!(device.pipeline_cache_len(), 4);

    device
        .draw(
            VertexBufferId(7),
            0,
            12,
            &lit,
            BlendMode::Off,
            DepthFunc::LessOrEqualWriteOff,
            CullMode::Back,
            FillMode::Solid,
            PrimitiveTopology::Triangles,
        )
        .unwrap();
    assert_eq!(device.pipeline_cache_len(), 5);
    let creations = device.backend().pipeline_creations();
    assert_eq!(creations.len(), 5);
    assert_eq!(creations[4].key.depth_func, DepthFunc::LessOrEqualWriteOff);

    let draws = device.backend().draws();
    assert_eq!(draws.len(), 7);
    assert_eq!(draws[0].0, draws[1].0);
    assert_ne!(draws[6].0, draws[0].0);
    assert_eq!(draws[2].1.raster.cull_mode, CullMode::Off);
    assert_eq!(draws[0].1.index_range(), 0..36);
}

#[test]
fn draw_with_invalid_shader_is_rejected() {
    let mut device = device();
    let broken = ShaderProgram {
        label: Some("broken".into()),
        vertex: Some(ShaderStageId(1)),
        pixel: None,
    };

    let err = draw_default(&mut device, 0, &broken, BlendMode::Off, CullMode::Back).unwrap_err();
    assert!(matches!(
        err,
        RenderError::ResourceError(ResourceError::Pipeline(PipelineError::InvalidShaderProgram(_)))
    ));
    assert_eq!(device.pipeline_cache_len(), 0);
    assert!(device.backend().calls.is_empty());
    assert_eq!(device.frame_statistics().draw_calls, 0);
}

#[test]
fn draw_uploads_uniforms_then_draws_and_counts() {
    let mut device = device();
    device.per_object_uniforms_mut().f0 = 0.25;
    draw_default(&mut device, 0, &shader("lit", 1, 2), BlendMode::Off, CullMode::Back).unwrap();

    let calls = &device.backend().calls;
    assert!(matches!(calls[0], Call::CreatePipelineState(_)));
    assert!(matches!(calls[1], Call::UploadUniforms(u) if u.f0 == 0.25));
    assert!(matches!(calls[2], Call::Draw(..)));

    let stats = device.frame_statistics();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.vertex_buffer_binds, 1);
}

#[test]
fn reset_frame_statistics_zeroes_counters_and_bumps_frame_index() {
    let mut device = device();
    device.reset_frame_statistics();
    device.increment_draw_calls();
    device.increment_texture_binds();
    device.increment_vertex_buffer_binds();
    assert_eq!(device.frame_statistics().frame_index, 1);

    device.reset_frame_statistics();
    let stats = device.frame_statistics();
    assert_eq!(stats.frame_index, 2);
    assert_eq!(stats.draw_calls, 0);
    assert_eq!(stats.texture_binds, 0);
    assert_eq!(stats.vertex_buffer_binds, 0);
}

#[test]
fn only_bound_textures_count_as_binds() {
    let mut device = device();
    device.set_texture("texture", TextureBinding::None, 0);
    device.set_texture("texture", TextureBinding::Texture2D(TextureId(3)), 1);
    assert_eq!(device.frame_statistics().texture_binds, 1);
    assert_eq!(device.backend().calls.len(), 2);
}

#[test]
fn clear_with_no_flags_records_nothing() {
    let mut device = device();
    device.clear_screen(ClearFlags::NONE);
    assert!(device.backend().calls.is_empty());
    assert_eq!(device.backbuffer_state(), BackbufferState::Present);
}

#[test]
fn frame_cycle_follows_transition_submit_present_wait_order() {
    let mut device = device();
    device.set_clear_color(0.1, 0.2, 0.3);

    device.reset_frame_statistics();
    device.clear_screen(ClearFlags::COLOR);
    assert_eq!(device.backbuffer_state(), BackbufferState::RenderTarget);
    device.present().unwrap();
    assert_eq!(device.backbuffer_state(), BackbufferState::Present);

    assert_eq!(
        device.backend().calls,
        vec![
            Call::Transition(BackbufferState::Present, BackbufferState::RenderTarget),
            Call::ViewportAndScissor(1920, 1080),
            Call::ClearAndBind([0.1, 0.2, 0.3, 1.0], 1.0),
            Call::Transition(BackbufferState::RenderTarget, BackbufferState::Present),
            Call::Submit(FenceValue(1)),
            Call::Present,
            Call::WaitForFence(FenceValue(1)),
            Call::ResetRecording,
        ]
    );
}

#[test]
fn present_without_clear_skips_the_transition() {
    let mut device = device();
    device.present().unwrap();
    assert!(!device
        .backend()
        .calls
        .iter()
        .any(|call| matches!(call, Call::Transition(..))));
}

#[test]
fn present_waits_for_the_fence_it_signalled() {
    let mut device = device();
    for _ in 0..2 {
        device.clear_screen(ClearFlags::ALL);
        device.present().unwrap();
    }

    let pairs: Vec<_> = device
        .backend()
        .calls
        .iter()
        .filter_map(|call| match call {
            Call::Submit(fence) | Call::WaitForFence(fence) => Some(*fence),
            _ => None,
        })
        .collect();
    assert_eq!(
        pairs,
        vec![FenceValue(1), FenceValue(1), FenceValue(2), FenceValue(2)]
    );
    assert_eq!(device.frame_fence().in_flight(), None);
    assert_eq!(device.frame_fence().last_completed(), Some(FenceValue(2)));
}

#[test]
fn present_failure_is_fatal() {
    let mut device = device();
    device.backend_mut().fail_present = true;
    device.clear_screen(ClearFlags::ALL);

    let err = device.present().unwrap_err();
    assert!(matches!(err, RenderError::DeviceLost));
    assert!(!device
        .backend()
        .calls
        .iter()
        .any(|call| matches!(call, Call::WaitForFence(_))));
}

#[test]
fn failed_uniform_upload_aborts_the_draw() {
    let mut device = device();
    device.backend_mut().fail_upload = true;

    let err = draw_default(&mut device, 0, &shader("lit", 1, 2), BlendMode::Off, CullMode::Back)
        .unwrap_err();
    assert!(matches!(err, RenderError::Internal(_)));
    assert!(device.backend().draws().is_empty());
    assert_eq!(device.frame_statistics().draw_calls, 0);
}

#[test]
fn release_destroys_pipelines_then_buffers_then_device_once() {
    let mut device = device();
    let buffer = device
        .create_texel_buffer(&TexelBufferDescriptor {
            label: None,
            size: 64,
            format: TexelFormat::R32Uint,
        })
        .unwrap();
    draw_default(&mut device, 0, &shader("a", 1, 2), BlendMode::Off, CullMode::Back).unwrap();
    draw_default(&mut device, 1, &shader("b", 1, 2), BlendMode::Off, CullMode::Back).unwrap();
    device.backend_mut().calls.clear();

    device.release_gpu_objects();
    assert!(device.is_released());
    assert_eq!(
        device.backend().calls,
        vec![
            Call::DestroyPipelineState(PipelineStateId(1)),
            Call::DestroyPipelineState(PipelineStateId(2)),
            Call::DestroyBuffer(buffer),
            Call::ReleaseDevice,
        ]
    );
    assert_eq!(device.pipeline_cache_len(), 0);

    device.release_gpu_objects();
    assert_eq!(device.backend().calls.len(), 4);
}

#[test]
fn destroying_an_unknown_buffer_fails() {
    let mut device = device();
    assert!(matches!(
        device.destroy_texel_buffer(GpuBufferId(42)),
        Err(ResourceError::NotFound)
    ));
}
