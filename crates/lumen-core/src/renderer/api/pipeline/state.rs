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

//! The pipeline-state cache key and the descriptors handed to backends.

use super::enums::{BlendMode, CullMode, DepthFunc, FillMode, PrimitiveTopology};
use crate::renderer::api::resource::{ShaderStageId, VertexBufferId};

/// An opaque handle to a pipeline state object compiled by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineStateId(pub usize);

/// Identifies one compiled pipeline state in the device cache.
///
/// Two draws share a pipeline state exactly when all five fields match.
/// Raster state (cull mode, fill mode, topology) is deliberately not part of
/// the key; it travels with each draw in [`DrawCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineStateKey {
    /// The vertex buffer whose layout feeds the input assembler.
    pub vertex_buffer: VertexBufferId,
    /// The compiled vertex stage.
    pub vertex_stage: ShaderStageId,
    /// The compiled pixel stage.
    pub pixel_stage: ShaderStageId,
    /// Output blending.
    pub blend_mode: BlendMode,
    /// Depth test/write policy.
    pub depth_func: DepthFunc,
}

/// Everything a backend needs to compile a pipeline state for a key.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStateDescriptor {
    /// A debug label, derived from the shader program's label.
    pub label: Option<String>,
    /// The identity of the pipeline state being built.
    pub key: PipelineStateKey,
    /// Raster state of the draw that triggered creation.
    pub raster: RasterState,
}

/// Per-draw fixed-function raster configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RasterState {
    /// Face culling.
    pub cull_mode: CullMode,
    /// Polygon fill.
    pub fill_mode: FillMode,
    /// Primitive assembly.
    pub topology: PrimitiveTopology,
}

/// One indexed draw, as submitted to a backend.
///
/// Faces are triangles: the draw consumes indices
/// `start_face * 3 .. (start_face + face_count) * 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommand {
    /// The geometry being drawn.
    pub vertex_buffer: VertexBufferId,
    /// First face of the range.
    pub start_face: u32,
    /// Number of faces in the range.
    pub face_count: u32,
    /// Raster configuration of this draw.
    pub raster: RasterState,
}

impl DrawCommand {
    /// Returns the index range consumed by this draw.
    pub fn index_range(&self) -> std::ops::Range<u32> {
        let start = self.start_face * 3;
        start..start + self.face_count * 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn key(blend_mode: BlendMode) -> PipelineStateKey {
        PipelineStateKey {
            vertex_buffer: VertexBufferId(1),
            vertex_stage: ShaderStageId(2),
            pixel_stage: ShaderStageId(3),
            blend_mode,
            depth_func: DepthFunc::LessOrEqualWriteOn,
        }
    }

    #[test]
    fn keys_hash_structurally() {
        let mut set = HashSet::new();
        set.insert(key(BlendMode::Off));
        set.insert(key(BlendMode::Off));
        set.insert(key(BlendMode::AlphaBlend));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn draw_command_index_range() {
        let draw = DrawCommand {
            vertex_buffer: VertexBufferId(0),
            start_face: 2,
            face_count: 4,
            raster: RasterState::default(),
        };
        assert_eq!(draw.index_range(), 6..18);
    }
}
