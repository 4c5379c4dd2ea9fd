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

// Lumen Sandbox
// Drives a few frames of the render loop over a small scene.
//
// Usage: sandbox [settings.json]

use anyhow::{anyhow, Context, Result};
use lumen_core::math::{Aabb, Frustum, Mat4, Vec3, FRAC_PI_4};
use lumen_core::renderer::*;
use lumen_infra::HeadlessBackend;
use std::sync::Arc;

const FRAME_COUNT: u64 = 4;
const POINT_LIGHT_COUNT: usize = 8;

/// Backend handles for the geometry, the one shader program and the depth-normals
/// target of the scene.
struct SceneAssets {
    cube: VertexBufferId,
    quad: VertexBufferId,
    program: ShaderProgram,
    depth_normals: RenderTexture,
}

impl SceneAssets {
    /// Handles for a backend that accepts any ID.
    fn placeholder(width: u32, height: u32) -> Self {
        Self {
            cube: VertexBufferId(0),
            quad: VertexBufferId(1),
            program: ShaderProgram::new("unlit", ShaderStageId(0), ShaderStageId(1)),
            depth_normals: RenderTexture::new_2d(RenderTextureId(0), width, height),
        }
    }
}

#[cfg_attr(not(feature = "wgpu"), allow(dead_code))]
const CUBE_POSITIONS: [[f32; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

const CUBE_INDICES: [u32; 36] = [
    4, 5, 6, 4, 6, 7, // +z
    1, 0, 3, 1, 3, 2, // -z
    5, 1, 2, 5, 2, 6, // +x
    0, 4, 7, 0, 7, 3, // -x
    7, 6, 2, 7, 2, 3, // +y
    0, 1, 5, 0, 5, 4, // -y
];

#[cfg_attr(not(feature = "wgpu"), allow(dead_code))]
const QUAD_POSITIONS: [[f32; 3]; 4] = [
    [-2.0, -2.0, 0.0],
    [2.0, -2.0, 0.0],
    [2.0, 2.0, 0.0],
    [-2.0, 2.0, 0.0],
];

const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

fn load_settings() -> Result<RenderSettings> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings file '{path}'"))?;
            let settings = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse settings file '{path}'"))?;
            log::info!("Loaded render settings from '{path}'.");
            Ok(settings)
        }
        None => Ok(RenderSettings::default()),
    }
}

#[cfg(feature = "wgpu")]
fn run_wgpu(settings: &RenderSettings) -> Result<()> {
    use lumen_infra::WgpuBackend;

    const SHADER: &str = include_str!("shaders/unlit.wgsl");

    let mut backend = WgpuBackend::new(settings.backbuffer_width, settings.backbuffer_height)?;
    let vertex = backend.register_shader_stage("unlit", SHADER, "vs_main");
    let pixel = backend.register_shader_stage("unlit", SHADER, "fs_main");
    // Slot order matches `params.values` in the shader.
    backend.declare_parameter("roughness")?;
    backend.declare_parameter("sunDirection")?;
    backend.declare_parameter("pointLightCount")?;
    let assets = SceneAssets {
        cube: backend.create_vertex_buffer(&CUBE_POSITIONS, &CUBE_INDICES),
        quad: backend.create_vertex_buffer(&QUAD_POSITIONS, &QUAD_INDICES),
        program: ShaderProgram::new("unlit", vertex, pixel),
        depth_normals: backend
            .create_render_texture(settings.backbuffer_width, settings.backbuffer_height),
    };
    run(GraphicsDevice::new(backend), settings, assets)
}

#[cfg(not(feature = "wgpu"))]
fn run_wgpu(_settings: &RenderSettings) -> Result<()> {
    Err(anyhow!(
        "the wgpu backend was requested but the sandbox was built without the `wgpu` feature"
    ))
}

fn run<B: GraphicsBackend>(
    mut device: GraphicsDevice<B>,
    settings: &RenderSettings,
    assets: SceneAssets,
) -> Result<()> {
    let [r, g, b] = settings.clear_color;
    device.set_clear_color(r, g, b);

    let unit_box = Aabb::from_min_max(Vec3::splat(-1.0), Vec3::ONE);
    let cube = Arc::new(Mesh::new(vec![SubMesh::new(
        assets.cube,
        CUBE_INDICES.len() as u32,
        unit_box,
    )]));
    let quad = Arc::new(Mesh::new(vec![SubMesh::new(
        assets.quad,
        QUAD_INDICES.len() as u32,
        Aabb::from_min_max(Vec3::new(-2.0, -2.0, 0.0), Vec3::new(2.0, 2.0, 0.0)),
    )]));

    let program = Arc::new(assets.program);
    let mut solid = Material::with_shader(Arc::clone(&program));
    solid.set_f0(0.9);
    solid.set_float("roughness", 0.4);
    let mut glass = Material::with_shader(program);
    glass.set_blending_mode(BlendingMode::Alpha);
    glass.set_depth_function(DepthFunction::LessOrEqualWriteOff);
    glass.set_back_face_culling(false);

    let mut globals = MaterialGlobals::new();
    globals.set_vector("sunDirection", Vec3::new(0.3, -1.0, 0.2));
    globals.set_int("pointLightCount", POINT_LIGHT_COUNT as i32);

    let mut pool = MeshRendererPool::new();
    let cube_handle = pool.new_component();
    let quad_handle = pool.new_component();
    if let Some(component) = pool.get_mut(cube_handle) {
        component.set_mesh(Some(cube));
        component.set_material(Some(Arc::new(solid)), 0);
        component.set_wireframe(settings.show_wireframe);
    }
    if let Some(component) = pool.get_mut(quad_handle) {
        component.set_mesh(Some(quad));
        component.set_material(Some(Arc::new(glass)), 0);
    }

    let mut tiler = LightTiler::new(settings.light_tiler);
    tiler.init(&mut device)?;
    for index in 0..POINT_LIGHT_COUNT {
        let angle = index as f32 / POINT_LIGHT_COUNT as f32 * std::f32::consts::TAU;
        let position = Vec3::new(angle.cos() * 4.0, 1.0, angle.sin() * 4.0);
        tiler.set_point_light_position_and_radius(index, position, 3.0);
    }
    tiler.set_spot_light_position_and_radius(0, Vec3::new(0.0, 5.0, 0.0), 8.0);

    let (width, height) = device.backbuffer_size();
    let aspect = width as f32 / height.max(1) as f32;
    let projection = Mat4::perspective_rh_zo(FRAC_PI_4, aspect, 0.1, 100.0);
    let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0))
        .ok_or_else(|| anyhow!("degenerate camera"))?;
    let frustum = Frustum::from_view_projection(&(projection * view));
    let depth_normals = assets.depth_normals;
    let light_culler = ComputeShader {
        id: ComputeShaderId(0),
        label: Some("light_culler".into()),
    };
    globals.set_render_texture("depthNormalsTex", depth_normals);

    for frame in 0..FRAME_COUNT {
        device.reset_frame_statistics();
        device.clear_screen(ClearFlags::ALL);

        let spin = Mat4::from_rotation_y(frame as f32 * 0.25);
        let placements = [
            (cube_handle, spin),
            (quad_handle, Mat4::from_translation(Vec3::new(0.0, 0.0, 2.0))),
        ];
        for (handle, local_to_world) in placements {
            if let Some(component) = pool.get_mut(handle) {
                component.cull(&frustum, &local_to_world);
            }
        }

        for render_type in [RenderType::Opaque, RenderType::Transparent] {
            for (handle, local_to_world) in placements {
                let Some(component) = pool.get_mut(handle) else {
                    continue;
                };
                let local_to_view = view * local_to_world;
                let transforms = RenderTransforms {
                    local_to_view,
                    local_to_clip: projection * local_to_view,
                    local_to_world,
                    ..RenderTransforms::default()
                };
                component.render(&mut device, &globals, &transforms, None, render_type)?;
            }
        }

        tiler.update_light_buffers(&mut device)?;
        let dispatch =
            tiler.cull_lights(&mut device, &light_culler, &projection, &view, &depth_normals)?;
        log::debug!("Light culling dispatch: {:?}", dispatch.groups);

        device.present()?;

        let stats = device.frame_statistics();
        log::info!(
            "Frame {}: {} draw calls, {} texture binds, {} vertex buffer binds, {} pipeline states",
            frame,
            stats.draw_calls,
            stats.texture_binds,
            stats.vertex_buffer_binds,
            device.pipeline_cache_len()
        );
    }

    tiler.destroy_objects(&mut device)?;
    device.release_gpu_objects();
    log::info!("Sandbox finished after {FRAME_COUNT} frames.");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .init();

    let settings = load_settings()?;
    log::info!("Starting sandbox with {:?} backend.", settings.backend);

    match settings.backend {
        BackendKind::Headless => {
            let backend =
                HeadlessBackend::new(settings.backbuffer_width, settings.backbuffer_height);
            run(
                GraphicsDevice::new(backend),
                &settings,
                SceneAssets::placeholder(settings.backbuffer_width, settings.backbuffer_height),
            )
        }
        BackendKind::Wgpu => run_wgpu(&settings),
    }
}
