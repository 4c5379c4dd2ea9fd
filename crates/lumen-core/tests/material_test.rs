mod common;

use common::{device, shader, Call};
use lumen_core::math::Vec3;
use lumen_core::renderer::*;
use std::sync::Arc;

fn render_texture(id: usize) -> RenderTexture {
    RenderTexture::new_2d(RenderTextureId(id), 512, 512)
}

#[test]
fn apply_binds_instance_parameters_before_globals() {
    let mut device = device();

    let mut material = Material::with_shader(Arc::new(shader("lit", 1, 2)));
    material.set_int("lightCount", 4);
    material.set_float("roughness", 0.5);
    material.set_texture(Some(TextureId(10)), 0);
    material.set_cube_texture(Some(TextureId(11)), 0);
    material.set_render_texture("reflection", render_texture(20));
    material.set_f0(0.04);

    let mut globals = MaterialGlobals::new();
    globals.set_render_texture("shadowMap", render_texture(30));
    globals.set_texture_2d("noise", TextureId(40));
    globals.set_float("roughness", 0.9);
    globals.set_int("frame", 7);
    globals.set_vector("sunDirection", Vec3::Y);

    material.apply(&mut device, &globals);

    let slots = TEXTURE_SLOT_COUNT as u32;
    let mut expected = vec![
        Call::UseShader(Some("lit".to_owned())),
        Call::SetInt("lightCount".to_owned(), 4),
        Call::SetFloat("roughness".to_owned(), 0.5),
        Call::SetTexture("texture".to_owned(), TextureBinding::Texture2D(TextureId(10)), 0),
    ];
    expected.extend(
        (1..slots).map(|unit| Call::SetTexture("texture".to_owned(), TextureBinding::None, unit)),
    );
    expected.extend([
        Call::SetTexture(
            "reflection".to_owned(),
            TextureBinding::RenderTexture(render_texture(20)),
            slots,
        ),
        Call::SetTexture(
            "shadowMap".to_owned(),
            TextureBinding::RenderTexture(render_texture(30)),
            slots + 1,
        ),
        Call::SetTexture("noise".to_owned(), TextureBinding::Texture2D(TextureId(40)), slots + 2),
        Call::SetFloat("roughness".to_owned(), 0.9),
        Call::SetInt("frame".to_owned(), 7),
        Call::SetVector3("sunDirection".to_owned(), Vec3::Y),
        Call::SetPolygonOffset(false, 0.0, 0.0),
    ]);

    assert_eq!(device.backend().calls, expected);
    assert_eq!(device.per_object_uniforms().f0, 0.04);
    assert_eq!(device.frame_statistics().texture_binds, 4);
}

#[test]
fn global_value_is_bound_last_for_shared_names() {
    let mut device = device();
    let mut material = Material::with_shader(Arc::new(shader("lit", 1, 2)));
    material.set_float("exposure", 1.0);
    let mut globals = MaterialGlobals::new();
    globals.set_float("exposure", 2.0);

    material.apply(&mut device, &globals);

    let last_exposure = device
        .backend()
        .calls
        .iter()
        .rev()
        .find_map(|call| match call {
            Call::SetFloat(name, value) if name == "exposure" => Some(*value),
            _ => None,
        });
    assert_eq!(last_exposure, Some(2.0));
}

#[test]
fn apply_without_shader_does_nothing() {
    let mut device = device();
    let mut material = Material::new();
    material.set_float("roughness", 0.5);
    material.set_f0(0.1);

    material.apply(&mut device, &MaterialGlobals::new());

    assert!(device.backend().calls.is_empty());
    assert_ne!(device.per_object_uniforms().f0, 0.1);
}

#[test]
fn significant_depth_offset_enables_polygon_offset() {
    let mut device = device();
    let mut material = Material::with_shader(Arc::new(shader("shadow", 1, 2)));
    material.set_depth_offset(1.5, 2.0);

    material.apply(&mut device, &MaterialGlobals::new());

    assert_eq!(
        device.backend().calls.last(),
        Some(&Call::SetPolygonOffset(true, 1.5, 2.0))
    );
}
