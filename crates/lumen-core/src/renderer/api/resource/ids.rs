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

//! Opaque handles to backend-owned GPU objects.
//!
//! The core never creates these resources itself. The asset layer and the
//! backend hand them over already compiled or uploaded, and the core passes
//! the handles back to the backend on use.

/// An opaque handle to an uploaded vertex/index buffer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexBufferId(pub usize);

/// An opaque handle to one compiled shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderStageId(pub usize);

/// An opaque handle to a sampled texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub usize);

/// An opaque handle to a texture that can be rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTextureId(pub usize);

/// An opaque handle to a GPU buffer created through the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuBufferId(pub usize);

/// An opaque handle to a compiled compute kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputeShaderId(pub usize);
