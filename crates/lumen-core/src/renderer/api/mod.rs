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

//! Backend-agnostic rendering API.
//!
//! Organized into several logical sub-modules:
//!
//! - **[`core`]**: Renderer configuration and per-frame statistics.
//! - **[`resource`]**: GPU handles (buffers, textures, render targets) and their descriptors.
//! - **[`pipeline`]**: Draw state enums and the pipeline-state cache key.
//! - **[`scene`]**: Geometry resources and the per-object uniform block.
//! - **[`shader`]**: Linked shader programs and compute kernels.
//! - **[`util`]**: Small flag types.

pub mod core;
pub mod pipeline;
pub mod resource;
pub mod scene;
pub mod shader;
pub mod util;

pub use self::core::*;
pub use self::pipeline::*;
pub use self::resource::*;
pub use self::scene::*;
pub use self::shader::*;
pub use self::util::*;
