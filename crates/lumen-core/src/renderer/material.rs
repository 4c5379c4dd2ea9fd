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

//! Materials: a shader program plus the parameters bound before each draw.
//!
//! Parameters come from two places. A [`Material`] carries instance values,
//! and a [`MaterialGlobals`] carries values shared by every material in a
//! render pass. [`Material::apply`] always binds instance values first and
//! globals second, so when both define a name the global one is bound last.

use crate::math::Vec3;
use crate::renderer::api::*;
use crate::renderer::device::GraphicsDevice;
use crate::renderer::traits::GraphicsBackend;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Number of 2D (and cube) texture slots of a material.
pub const TEXTURE_SLOT_COUNT: usize = 13;

/// Depth bias values at or below this magnitude count as zero.
const POLYGON_OFFSET_EPSILON: f32 = 1e-4;

/// Name of the shader parameter every 2D texture slot binds to.
const TEXTURE_SLOT_PARAMETER: &str = "texture";

/// How a material's output is blended, and which render pass draws it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendingMode {
    /// Opaque; drawn in the opaque pass.
    #[default]
    Off,
    /// Alpha blended; drawn in the transparent pass.
    Alpha,
    /// Additive; drawn in the transparent pass.
    Additive,
}

/// Depth test and write policy of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFunction {
    /// Test with less-or-equal and write depth.
    #[default]
    LessOrEqualWriteOn,
    /// Test with less-or-equal, leave depth untouched.
    LessOrEqualWriteOff,
    /// No test, no write.
    NoneWriteOff,
}

impl From<DepthFunction> for DepthFunc {
    fn from(value: DepthFunction) -> Self {
        match value {
            DepthFunction::LessOrEqualWriteOn => DepthFunc::LessOrEqualWriteOn,
            DepthFunction::LessOrEqualWriteOff => DepthFunc::LessOrEqualWriteOff,
            DepthFunction::NoneWriteOff => DepthFunc::NoneWriteOff,
        }
    }
}

/// Parameters shared by every material of a render pass.
///
/// Applied after each material's own parameters.
#[derive(Debug, Clone, Default)]
pub struct MaterialGlobals {
    render_textures: BTreeMap<String, RenderTexture>,
    textures_2d: BTreeMap<String, TextureId>,
    floats: BTreeMap<String, f32>,
    ints: BTreeMap<String, i32>,
    vectors: BTreeMap<String, Vec3>,
}

impl MaterialGlobals {
    /// Creates an empty set of globals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a render target to `name` for every material.
    pub fn set_render_texture(&mut self, name: impl Into<String>, texture: RenderTexture) {
        self.render_textures.insert(name.into(), texture);
    }

    /// Binds a 2D texture to `name` for every material.
    pub fn set_texture_2d(&mut self, name: impl Into<String>, texture: TextureId) {
        self.textures_2d.insert(name.into(), texture);
    }

    /// Sets a float parameter for every material.
    pub fn set_float(&mut self, name: impl Into<String>, value: f32) {
        self.floats.insert(name.into(), value);
    }

    /// Sets an integer parameter for every material.
    pub fn set_int(&mut self, name: impl Into<String>, value: i32) {
        self.ints.insert(name.into(), value);
    }

    /// Sets a vector parameter for every material.
    pub fn set_vector(&mut self, name: impl Into<String>, value: Vec3) {
        self.vectors.insert(name.into(), value);
    }

    /// Removes every global parameter.
    pub fn clear(&mut self) {
        self.render_textures.clear();
        self.textures_2d.clear();
        self.floats.clear();
        self.ints.clear();
        self.vectors.clear();
    }

    /// Returns `true` if no global parameter is set.
    pub fn is_empty(&self) -> bool {
        self.render_textures.is_empty()
            && self.textures_2d.is_empty()
            && self.floats.is_empty()
            && self.ints.is_empty()
            && self.vectors.is_empty()
    }
}

/// A shader program and the parameter values bound before drawing with it.
#[derive(Debug, Clone)]
pub struct Material {
    shader: Option<Arc<ShaderProgram>>,
    texture_2d_slots: [Option<TextureId>; TEXTURE_SLOT_COUNT],
    texture_cube_slots: [Option<TextureId>; TEXTURE_SLOT_COUNT],
    render_textures: BTreeMap<String, RenderTexture>,
    floats: BTreeMap<String, f32>,
    ints: BTreeMap<String, i32>,
    blending_mode: BlendingMode,
    depth_function: DepthFunction,
    back_face_culling: bool,
    depth_factor: f32,
    depth_units: f32,
    f0: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            shader: None,
            texture_2d_slots: [None; TEXTURE_SLOT_COUNT],
            texture_cube_slots: [None; TEXTURE_SLOT_COUNT],
            render_textures: BTreeMap::new(),
            floats: BTreeMap::new(),
            ints: BTreeMap::new(),
            blending_mode: BlendingMode::Off,
            depth_function: DepthFunction::LessOrEqualWriteOn,
            back_face_culling: true,
            depth_factor: 0.0,
            depth_units: 0.0,
            f0: 0.8,
        }
    }
}

impl Material {
    /// Creates a material without a shader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a material drawing with `shader`.
    pub fn with_shader(shader: Arc<ShaderProgram>) -> Self {
        Self {
            shader: Some(shader),
            ..Self::default()
        }
    }

    /// Binds the shader and every parameter, then sets depth bias and `f0`.
    ///
    /// Does nothing if the material has no shader.
    pub fn apply<B: GraphicsBackend>(
        &self,
        device: &mut GraphicsDevice<B>,
        globals: &MaterialGlobals,
    ) {
        let Some(shader) = self.shader.as_deref() else {
            return;
        };

        device.use_shader(shader);

        for (name, &value) in &self.ints {
            device.set_int(name, value);
        }
        for (name, &value) in &self.floats {
            device.set_float(name, value);
        }

        for (slot, texture) in self.texture_2d_slots.iter().enumerate() {
            let binding = texture.map_or(TextureBinding::None, TextureBinding::Texture2D);
            device.set_texture(TEXTURE_SLOT_PARAMETER, binding, slot as u32);
        }

        // Named textures take the units after the fixed slots.
        let mut unit = TEXTURE_SLOT_COUNT as u32;
        for (name, &texture) in &self.render_textures {
            device.set_texture(name, TextureBinding::RenderTexture(texture), unit);
            unit += 1;
        }
        for (name, &texture) in &globals.render_textures {
            device.set_texture(name, TextureBinding::RenderTexture(texture), unit);
            unit += 1;
        }
        for (name, &texture) in &globals.textures_2d {
            device.set_texture(name, TextureBinding::Texture2D(texture), unit);
            unit += 1;
        }

        for (name, &value) in &globals.floats {
            device.set_float(name, value);
        }
        for (name, &value) in &globals.ints {
            device.set_int(name, value);
        }
        for (name, &value) in &globals.vectors {
            device.set_vector3(name, value);
        }

        match self.polygon_offset() {
            Some((factor, units)) => device.set_polygon_offset(true, factor, units),
            None => device.set_polygon_offset(false, 0.0, 0.0),
        }

        device.per_object_uniforms_mut().f0 = self.f0;
    }

    /// Returns the depth bias `(factor, units)` if either is non-negligible.
    pub fn polygon_offset(&self) -> Option<(f32, f32)> {
        let significant = self.depth_factor.abs() > POLYGON_OFFSET_EPSILON
            || self.depth_units.abs() > POLYGON_OFFSET_EPSILON;
        significant.then_some((self.depth_factor, self.depth_units))
    }

    /// Returns `true` if the material has a shader with both stages compiled.
    pub fn is_valid_shader(&self) -> bool {
        self.shader.as_ref().is_some_and(|shader| shader.is_valid())
    }

    /// The shader program, if any.
    pub fn shader(&self) -> Option<&Arc<ShaderProgram>> {
        self.shader.as_ref()
    }

    /// Sets or clears the shader program.
    pub fn set_shader(&mut self, shader: Option<Arc<ShaderProgram>>) {
        self.shader = shader;
    }

    /// Puts a 2D texture into `slot`. Out-of-range slots are ignored.
    pub fn set_texture(&mut self, texture: Option<TextureId>, slot: usize) {
        if let Some(entry) = self.texture_2d_slots.get_mut(slot) {
            *entry = texture;
        }
    }

    /// Returns the 2D texture in `slot`.
    pub fn texture(&self, slot: usize) -> Option<TextureId> {
        self.texture_2d_slots.get(slot).copied().flatten()
    }

    /// Puts a cube texture into `slot`. Out-of-range slots are ignored.
    pub fn set_cube_texture(&mut self, texture: Option<TextureId>, slot: usize) {
        if let Some(entry) = self.texture_cube_slots.get_mut(slot) {
            *entry = texture;
        }
    }

    /// Returns the cube texture in `slot`.
    pub fn cube_texture(&self, slot: usize) -> Option<TextureId> {
        self.texture_cube_slots.get(slot).copied().flatten()
    }

    /// Binds a render target to `name` for this material.
    pub fn set_render_texture(&mut self, name: impl Into<String>, texture: RenderTexture) {
        self.render_textures.insert(name.into(), texture);
    }

    /// Sets a float parameter.
    pub fn set_float(&mut self, name: impl Into<String>, value: f32) {
        self.floats.insert(name.into(), value);
    }

    /// Sets an integer parameter.
    pub fn set_int(&mut self, name: impl Into<String>, value: i32) {
        self.ints.insert(name.into(), value);
    }

    /// The blending mode.
    pub fn blending_mode(&self) -> BlendingMode {
        self.blending_mode
    }

    /// Sets the blending mode.
    pub fn set_blending_mode(&mut self, mode: BlendingMode) {
        self.blending_mode = mode;
    }

    /// The depth function.
    pub fn depth_function(&self) -> DepthFunction {
        self.depth_function
    }

    /// Sets the depth function.
    pub fn set_depth_function(&mut self, function: DepthFunction) {
        self.depth_function = function;
    }

    /// Returns `true` if back faces are culled.
    pub fn back_face_culling(&self) -> bool {
        self.back_face_culling
    }

    /// Enables or disables back-face culling.
    pub fn set_back_face_culling(&mut self, enable: bool) {
        self.back_face_culling = enable;
    }

    /// Sets the depth bias applied to draws with this material.
    pub fn set_depth_offset(&mut self, factor: f32, units: f32) {
        self.depth_factor = factor;
        self.depth_units = units;
    }

    /// Reflectance at normal incidence.
    pub fn f0(&self) -> f32 {
        self.f0
    }

    /// Sets the reflectance at normal incidence.
    pub fn set_f0(&mut self, f0: f32) {
        self.f0 = f0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(valid: bool) -> Arc<ShaderProgram> {
        Arc::new(ShaderProgram {
            label: None,
            vertex: Some(ShaderStageId(1)),
            pixel: valid.then_some(ShaderStageId(2)),
        })
    }

    #[test]
    fn shader_validity() {
        assert!(!Material::new().is_valid_shader());
        assert!(!Material::with_shader(program(false)).is_valid_shader());
        assert!(Material::with_shader(program(true)).is_valid_shader());
    }

    #[test]
    fn out_of_range_texture_slots_are_ignored() {
        let mut material = Material::new();
        material.set_texture(Some(TextureId(4)), 2);
        material.set_texture(Some(TextureId(5)), TEXTURE_SLOT_COUNT);
        material.set_cube_texture(Some(TextureId(6)), TEXTURE_SLOT_COUNT + 3);
        assert_eq!(material.texture(2), Some(TextureId(4)));
        assert_eq!(material.texture(TEXTURE_SLOT_COUNT), None);
        assert!((0..TEXTURE_SLOT_COUNT).all(|slot| material.cube_texture(slot).is_none()));
    }

    #[test]
    fn polygon_offset_threshold() {
        let mut material = Material::new();
        assert_eq!(material.polygon_offset(), None);

        material.set_depth_offset(0.0001, -0.0001);
        assert_eq!(material.polygon_offset(), None);

        material.set_depth_offset(0.0, -0.00011);
        assert_eq!(material.polygon_offset(), Some((0.0, -0.00011)));

        material.set_depth_offset(2.0, 0.0);
        assert_eq!(material.polygon_offset(), Some((2.0, 0.0)));
    }

    #[test]
    fn every_depth_function_maps_to_a_device_func() {
        assert_eq!(
            DepthFunc::from(DepthFunction::LessOrEqualWriteOn),
            DepthFunc::LessOrEqualWriteOn
        );
        assert_eq!(
            DepthFunc::from(DepthFunction::LessOrEqualWriteOff),
            DepthFunc::LessOrEqualWriteOff
        );
        assert_eq!(DepthFunc::from(DepthFunction::NoneWriteOff), DepthFunc::NoneWriteOff);
    }

    #[test]
    fn globals_clear() {
        let mut globals = MaterialGlobals::new();
        globals.set_float("exposure", 1.5);
        globals.set_vector("sunDirection", Vec3::Y);
        assert!(!globals.is_empty());
        globals.clear();
        assert!(globals.is_empty());
    }
}
