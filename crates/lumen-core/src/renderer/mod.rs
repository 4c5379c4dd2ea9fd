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

//! Provides the backend-agnostic rendering core.
//!
//! The [`GraphicsBackend`] trait is the contract a native graphics API
//! implementation fulfils. Everything above it is backend-independent: the
//! [`GraphicsDevice`] frontend with its pipeline-state cache and frame cycle,
//! [`Material`] parameter binding, the [`MeshRendererComponent`] culling and
//! draw dispatch, and the [`LightTiler`]. Concrete backends live in the
//! `lumen-infra` crate.

pub mod api;
pub mod device;
pub mod error;
pub mod light_tiler;
pub mod material;
pub mod mesh_renderer;
pub mod traits;

// Re-export the most important traits and types for easier use.
pub use self::api::*;
pub use self::device::{FrameFence, GraphicsDevice};
pub use self::error::{PipelineError, RenderError, ResourceError, ShaderError};
pub use self::light_tiler::{
    LightCullingDispatch, LightTiler, LightTilerBuffers, LightTilerConfig, TileGrid,
};
pub use self::material::{
    BlendingMode, DepthFunction, Material, MaterialGlobals, TEXTURE_SLOT_COUNT,
};
pub use self::mesh_renderer::{
    MeshRendererComponent, MeshRendererHandle, MeshRendererPool, RenderTransforms, RenderType,
};
pub use self::traits::GraphicsBackend;
