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

//! Texture descriptions and the binding values a material hands to the device.

use super::ids::{RenderTextureId, TextureId};

/// A render target together with the dimensions it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTexture {
    /// The backend handle.
    pub id: RenderTextureId,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// `true` for a six-faced cube target.
    pub is_cube: bool,
}

impl RenderTexture {
    /// Creates a 2D render target description.
    pub const fn new_2d(id: RenderTextureId, width: u32, height: u32) -> Self {
        Self {
            id,
            width,
            height,
            is_cube: false,
        }
    }
}

/// The value bound to a named texture parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureBinding {
    /// The "no texture" sentinel; the backend binds its default texture.
    #[default]
    None,
    /// A sampled 2D texture.
    Texture2D(TextureId),
    /// A sampled cube texture.
    TextureCube(TextureId),
    /// A render target sampled as a texture.
    RenderTexture(RenderTexture),
}

impl TextureBinding {
    /// Returns `true` unless this is the [`TextureBinding::None`] sentinel.
    pub const fn is_bound(&self) -> bool {
        !matches!(self, TextureBinding::None)
    }
}
