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

//! Global settings for the rendering system.

use crate::renderer::light_tiler::LightTilerConfig;
use serde::{Deserialize, Serialize};

/// Selects which [`GraphicsBackend`](crate::renderer::traits::GraphicsBackend)
/// implementation drives the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// A CPU-only backend that records calls and never touches a GPU.
    #[default]
    Headless,
    /// A `wgpu` backend rendering into an off-screen backbuffer.
    Wgpu,
}

/// A collection of global settings that configure the device and the light tiler.
///
/// Every field has a default, so a partial JSON document is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Width of the backbuffer in pixels.
    pub backbuffer_width: u32,
    /// Height of the backbuffer in pixels.
    pub backbuffer_height: u32,
    /// The RGB color used by `clear_screen`.
    pub clear_color: [f32; 3],
    /// The backend that drives the device.
    pub backend: BackendKind,
    /// If `true`, mesh renderers draw in wireframe mode.
    pub show_wireframe: bool,
    /// Light tiler capacities.
    pub light_tiler: LightTilerConfig,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            backbuffer_width: 1920,
            backbuffer_height: 1080,
            clear_color: [0.0, 0.0, 0.0],
            backend: BackendKind::Headless,
            show_wireframe: false,
            light_tiler: LightTilerConfig::default(),
        }
    }
}
