use lumen_core::math::{Aabb, Frustum, Mat4, Vec3, FRAC_PI_2};
use lumen_core::renderer::*;
use lumen_infra::{BackendCall, HeadlessBackend};
use std::sync::Arc;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn cube() -> Arc<Mesh> {
    let aabb = Aabb::from_min_max(Vec3::splat(-1.0), Vec3::ONE);
    Arc::new(Mesh::new(vec![
        SubMesh::new(VertexBufferId(0), 36, aabb),
        SubMesh::new(VertexBufferId(1), 6, aabb),
    ]))
}

fn program(label: &'static str) -> Arc<ShaderProgram> {
    Arc::new(ShaderProgram::new(label, ShaderStageId(0), ShaderStageId(1)))
}

fn camera() -> (Mat4, Mat4) {
    let projection = Mat4::perspective_rh_zo(FRAC_PI_2, 16.0 / 9.0, 0.1, 100.0);
    let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
    (projection, view)
}

#[test]
fn full_frame_runs_in_order() {
    init_logger();
    let mut device = GraphicsDevice::new(HeadlessBackend::new(1280, 720));
    device.set_clear_color(0.1, 0.2, 0.3);

    let mut opaque = Material::with_shader(program("opaque"));
    opaque.set_f0(0.5);
    let mut glass = Material::with_shader(program("glass"));
    glass.set_blending_mode(BlendingMode::Alpha);
    let mut component = MeshRendererComponent::new();
    component.set_mesh(Some(cube()));
    component.set_material(Some(Arc::new(opaque)), 0);
    component.set_material(Some(Arc::new(glass)), 1);

    let (projection, view) = camera();
    let transforms = RenderTransforms {
        local_to_view: view,
        local_to_clip: projection * view,
        ..RenderTransforms::default()
    };
    let globals = MaterialGlobals::new();

    device.reset_frame_statistics();
    device.clear_screen(ClearFlags::ALL);
    component.cull(&Frustum::from_view_projection(&(projection * view)), &Mat4::IDENTITY);
    assert!(!component.is_culled());
    component
        .render(&mut device, &globals, &transforms, None, RenderType::Opaque)
        .unwrap();
    component
        .render(&mut device, &globals, &transforms, None, RenderType::Transparent)
        .unwrap();
    device.present().unwrap();

    assert_eq!(device.frame_statistics().draw_calls, 2);
    assert_eq!(device.pipeline_cache_len(), 2);

    let calls = device.backend().calls();
    assert_eq!(
        calls[0],
        BackendCall::Transition {
            from: BackbufferState::Present,
            to: BackbufferState::RenderTarget,
        }
    );
    assert_eq!(calls[1], BackendCall::ViewportAndScissor(1280, 720));
    assert_eq!(calls[2], BackendCall::ClearAndBind([0.1, 0.2, 0.3, 1.0]));

    let draws: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            BackendCall::Draw(_, command) => Some(*command),
            _ => None,
        })
        .collect();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].vertex_buffer, VertexBufferId(0));
    assert_eq!(draws[0].index_range(), 0..36);
    assert_eq!(draws[1].vertex_buffer, VertexBufferId(1));

    let tail = &calls[calls.len() - 5..];
    assert_eq!(
        tail[0],
        BackendCall::Transition {
            from: BackbufferState::RenderTarget,
            to: BackbufferState::Present,
        }
    );
    assert!(matches!(tail[1], BackendCall::Submit(FenceValue(1))));
    assert_eq!(tail[2], BackendCall::Present);
    assert_eq!(tail[3], BackendCall::WaitForFence(FenceValue(1)));
    assert_eq!(tail[4], BackendCall::ResetCommandRecording);
    assert_eq!(device.frame_fence().last_completed(), Some(FenceValue(1)));
}

#[test]
fn second_frame_reuses_cached_pipelines() {
    init_logger();
    let mut device = GraphicsDevice::new(HeadlessBackend::default());
    let mut component = MeshRendererComponent::new();
    component.set_mesh(Some(cube()));
    let material = Arc::new(Material::with_shader(program("lit")));
    component.set_material(Some(Arc::clone(&material)), 0);
    component.set_material(Some(material), 1);

    for _ in 0..2 {
        device.reset_frame_statistics();
        device.clear_screen(ClearFlags::COLOR | ClearFlags::DEPTH);
        component
            .render(
                &mut device,
                &MaterialGlobals::new(),
                &RenderTransforms::default(),
                None,
                RenderType::Opaque,
            )
            .unwrap();
        device.present().unwrap();
    }

    let creations = device
        .backend()
        .calls()
        .iter()
        .filter(|call| matches!(call, BackendCall::CreatePipelineState(_)))
        .count();
    // One pipeline per vertex buffer.
    assert_eq!(creations, 2);
    assert_eq!(device.backend().live_pipeline_count(), 2);
}

#[test]
fn light_tiler_buffers_live_in_the_backend() {
    init_logger();
    let mut device = GraphicsDevice::new(HeadlessBackend::new(1920, 1080));
    let mut tiler = LightTiler::default();
    tiler.init(&mut device).unwrap();
    let buffers = tiler.buffers().unwrap();
    assert_eq!(device.backend().live_buffer_count(), 3);

    tiler.set_point_light_position_and_radius(0, Vec3::new(1.0, 2.0, 3.0), 4.0);
    tiler.set_point_light_position_and_radius(1, Vec3::new(-1.0, 0.0, 0.0), 2.0);
    tiler.update_light_buffers(&mut device).unwrap();

    let point_bytes = device.backend().buffer_contents(buffers.point_lights).unwrap();
    let first: &[f32] = bytemuck::cast_slice(&point_bytes[..16]);
    assert_eq!(first, &[1.0, 2.0, 3.0, 4.0]);

    let (projection, view) = camera();
    let target = RenderTexture::new_2d(RenderTextureId(0), 1920, 1080);
    let kernel = ComputeShader {
        id: ComputeShaderId(0),
        label: Some("light_culler".into()),
    };
    let dispatch = tiler
        .cull_lights(&mut device, &kernel, &projection, &view, &target)
        .unwrap();
    assert_eq!(dispatch.groups, [tiler.num_tiles_x(), tiler.num_tiles_y(), 1]);
    let uniforms = device.backend().last_uniforms().unwrap();
    assert_eq!(uniforms.num_lights, PerObjectUniforms::pack_light_counts(2, 0));
    assert_eq!(uniforms.window_width, 1920);

    tiler.destroy_objects(&mut device).unwrap();
    assert_eq!(device.backend().live_buffer_count(), 0);
}

#[test]
fn release_tears_everything_down_once() {
    init_logger();
    let mut device = GraphicsDevice::new(HeadlessBackend::default());
    let mut tiler = LightTiler::default();
    tiler.init(&mut device).unwrap();
    let mut component = MeshRendererComponent::new();
    component.set_mesh(Some(cube()));
    component.set_material(Some(Arc::new(Material::with_shader(program("lit")))), 0);
    component
        .render(
            &mut device,
            &MaterialGlobals::new(),
            &RenderTransforms::default(),
            None,
            RenderType::Opaque,
        )
        .unwrap();

    device.release_gpu_objects();
    assert!(device.backend().is_released());
    assert_eq!(device.backend().live_pipeline_count(), 0);
    assert_eq!(device.backend().live_buffer_count(), 0);

    let before = device.backend().calls().len();
    device.release_gpu_objects();
    assert_eq!(device.backend().calls().len(), before);
}
