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

//! Draw state selectors accepted by
//! [`GraphicsDevice::draw`](crate::renderer::GraphicsDevice::draw).

use serde::{Deserialize, Serialize};

/// How a draw's output is combined with the color already in the render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// Source replaces destination.
    #[default]
    Off,
    /// `src * src_alpha + dst * (1 - src_alpha)`.
    AlphaBlend,
    /// `src + dst`.
    Additive,
}

/// Depth test and depth write policy of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DepthFunc {
    /// Pass when the fragment is nearer or equal; write depth.
    #[default]
    LessOrEqualWriteOn,
    /// Pass when the fragment is nearer or equal; keep depth untouched.
    LessOrEqualWriteOff,
    /// Depth testing and writing disabled.
    NoneWriteOff,
}

impl DepthFunc {
    /// Returns `true` if the draw runs a depth comparison.
    pub const fn test_enabled(self) -> bool {
        !matches!(self, DepthFunc::NoneWriteOff)
    }

    /// Returns `true` if the draw writes to the depth buffer.
    pub const fn write_enabled(self) -> bool {
        matches!(self, DepthFunc::LessOrEqualWriteOn)
    }
}

/// Which triangle faces are discarded by the rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Draw both faces.
    Off,
    /// Discard back faces.
    #[default]
    Back,
    /// Discard front faces.
    Front,
}

/// How polygons are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    /// Filled triangles.
    #[default]
    Solid,
    /// Triangle edges only.
    Wireframe,
}

/// How the index stream is assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Every three indices form a triangle.
    #[default]
    Triangles,
    /// Every two indices form a line.
    Lines,
}
