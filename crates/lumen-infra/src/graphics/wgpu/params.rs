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

//! CPU-side staging of named shader parameters for the next draw.
//!
//! Scalars and vectors live in a fixed block of `vec4<f32>` slots, one slot per
//! declared name. Integers are stored bit-for-bit in `x` and read back with
//! `bitcast<i32>`. A matrix array becomes a range of the frame's palette
//! buffer, recorded in `palette_base` and `palette_len`.

use lumen_core::math::{Mat4, Vec3};
use lumen_core::renderer::api::{RenderTextureId, TextureBinding, TextureId};
use lumen_core::renderer::ResourceError;
use std::collections::{HashMap, HashSet};

/// Number of `vec4<f32>` slots in a [`DrawParameters`] block.
pub const PARAMETER_SLOTS: usize = 32;
/// Number of sampled texture bindings at group 1; the sampler follows them.
pub const TEXTURE_UNITS: usize = 16;

/// The block bound at group 0, binding 1.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub(super) struct DrawParameters {
    pub values: [[f32; 4]; PARAMETER_SLOTS],
    pub palette_base: u32,
    pub palette_len: u32,
    /// Keeps the block a multiple of 16 bytes.
    pub _padding: [u32; 2],
}

impl Default for DrawParameters {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

/// What a texture unit samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(super) enum TextureSource {
    #[default]
    Fallback,
    Texture(TextureId),
    RenderTexture(RenderTextureId),
}

/// Parameters set since the last `use_shader`.
#[derive(Debug, Default)]
pub(super) struct ParameterTable {
    slots: HashMap<String, usize>,
    block: DrawParameters,
    palette: Vec<Mat4>,
    textures: [TextureSource; TEXTURE_UNITS],
    warned: HashSet<String>,
}

impl ParameterTable {
    /// Assigns `name` the next free slot, or returns the slot it already has.
    pub fn declare(&mut self, name: &str) -> Result<u32, ResourceError> {
        if let Some(&slot) = self.slots.get(name) {
            return Ok(slot as u32);
        }
        let slot = self.slots.len();
        if slot >= PARAMETER_SLOTS {
            return Err(ResourceError::OutOfBounds);
        }
        self.slots.insert(name.to_owned(), slot);
        Ok(slot as u32)
    }

    /// Forgets every value; declarations survive.
    pub fn clear(&mut self) {
        self.block = DrawParameters::default();
        self.palette.clear();
        self.textures = [TextureSource::Fallback; TEXTURE_UNITS];
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        if let Some(slot) = self.slot(name) {
            self.block.values[slot] = [f32::from_bits(value as u32), 0.0, 0.0, 0.0];
        }
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        if let Some(slot) = self.slot(name) {
            self.block.values[slot] = [value, 0.0, 0.0, 0.0];
        }
    }

    pub fn set_vector3(&mut self, name: &str, value: Vec3) {
        if let Some(slot) = self.slot(name) {
            self.block.values[slot] = [value.x, value.y, value.z, 0.0];
        }
    }

    /// Replaces the palette. Only one matrix array reaches a draw.
    pub fn set_matrix_array(&mut self, name: &str, matrices: &[Mat4]) {
        if !self.palette.is_empty() {
            self.warn_once(name, "replaces a matrix array already set for this draw");
        }
        self.palette.clear();
        self.palette.extend_from_slice(matrices);
    }

    pub fn set_texture(&mut self, name: &str, texture: TextureBinding, unit: u32) {
        let unit = unit as usize;
        if unit >= TEXTURE_UNITS {
            self.warn_once(name, "uses a texture unit past the last binding");
            return;
        }
        self.textures[unit] = match texture {
            TextureBinding::None => TextureSource::Fallback,
            TextureBinding::Texture2D(id) => TextureSource::Texture(id),
            TextureBinding::RenderTexture(texture) if !texture.is_cube => {
                TextureSource::RenderTexture(texture.id)
            }
            TextureBinding::TextureCube(_) | TextureBinding::RenderTexture(_) => {
                self.warn_once(name, "is a cube texture, which this backend cannot sample");
                TextureSource::Fallback
            }
        };
    }

    /// The block for a draw whose palette starts at `palette_base`.
    pub fn block(&self, palette_base: u32) -> DrawParameters {
        DrawParameters {
            palette_base,
            palette_len: self.palette.len() as u32,
            ..self.block
        }
    }

    pub fn palette(&self) -> &[Mat4] {
        &self.palette
    }

    pub fn textures(&self) -> [TextureSource; TEXTURE_UNITS] {
        self.textures
    }

    fn slot(&mut self, name: &str) -> Option<usize> {
        let slot = self.slots.get(name).copied();
        if slot.is_none() {
            self.warn_once(name, "was never declared and is dropped");
        }
        slot
    }

    fn warn_once(&mut self, name: &str, problem: &str) {
        if self.warned.insert(format!("{name}: {problem}")) {
            log::warn!("Shader parameter '{name}' {problem}");
        }
    }
}
