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

use lumen_core::renderer::api::pipeline::{
    BlendMode, CullMode, DepthFunc, FillMode, PrimitiveTopology,
};

/// A local extension trait to convert the core's state enums into WGPU types.
/// This avoids Rust's orphan rules while keeping an idiomatic `.into_wgpu()` syntax.
pub trait IntoWgpu<T> {
    /// Consumes self and converts it into a WGPU-compatible type.
    fn into_wgpu(self) -> T;
}

// --- Output merger ---

impl IntoWgpu<Option<wgpu::BlendState>> for BlendMode {
    fn into_wgpu(self) -> Option<wgpu::BlendState> {
        match self {
            BlendMode::Off => None,
            BlendMode::AlphaBlend => Some(wgpu::BlendState::ALPHA_BLENDING),
            BlendMode::Additive => {
                let additive = wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                };
                Some(wgpu::BlendState {
                    color: additive,
                    alpha: additive,
                })
            }
        }
    }
}

impl IntoWgpu<wgpu::CompareFunction> for DepthFunc {
    fn into_wgpu(self) -> wgpu::CompareFunction {
        match self {
            DepthFunc::LessOrEqualWriteOn | DepthFunc::LessOrEqualWriteOff => {
                wgpu::CompareFunction::LessEqual
            }
            DepthFunc::NoneWriteOff => wgpu::CompareFunction::Always,
        }
    }
}

// --- Rasterizer ---

impl IntoWgpu<Option<wgpu::Face>> for CullMode {
    fn into_wgpu(self) -> Option<wgpu::Face> {
        match self {
            CullMode::Off => None,
            CullMode::Back => Some(wgpu::Face::Back),
            CullMode::Front => Some(wgpu::Face::Front),
        }
    }
}

impl IntoWgpu<wgpu::PolygonMode> for FillMode {
    fn into_wgpu(self) -> wgpu::PolygonMode {
        match self {
            FillMode::Solid => wgpu::PolygonMode::Fill,
            FillMode::Wireframe => wgpu::PolygonMode::Line,
        }
    }
}

impl IntoWgpu<wgpu::PrimitiveTopology> for PrimitiveTopology {
    fn into_wgpu(self) -> wgpu::PrimitiveTopology {
        match self {
            PrimitiveTopology::Triangles => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveTopology::Lines => wgpu::PrimitiveTopology::LineList,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_modes_map_to_fixed_function_state() {
        let off: Option<wgpu::BlendState> = BlendMode::Off.into_wgpu();
        assert!(off.is_none());
        let alpha: Option<wgpu::BlendState> = BlendMode::AlphaBlend.into_wgpu();
        assert_eq!(alpha, Some(wgpu::BlendState::ALPHA_BLENDING));
        let additive: Option<wgpu::BlendState> = BlendMode::Additive.into_wgpu();
        let additive = additive.unwrap();
        assert_eq!(additive.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(additive.color.dst_factor, wgpu::BlendFactor::One);
    }

    #[test]
    fn depth_none_always_passes() {
        let compare: wgpu::CompareFunction = DepthFunc::NoneWriteOff.into_wgpu();
        assert_eq!(compare, wgpu::CompareFunction::Always);
        let compare: wgpu::CompareFunction = DepthFunc::LessOrEqualWriteOff.into_wgpu();
        assert_eq!(compare, wgpu::CompareFunction::LessEqual);
    }

    #[test]
    fn cull_and_topology() {
        let face: Option<wgpu::Face> = CullMode::Off.into_wgpu();
        assert!(face.is_none());
        let face: Option<wgpu::Face> = CullMode::Front.into_wgpu();
        assert_eq!(face, Some(wgpu::Face::Front));
        let topology: wgpu::PrimitiveTopology = PrimitiveTopology::Lines.into_wgpu();
        assert_eq!(topology, wgpu::PrimitiveTopology::LineList);
    }
}
