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

//! Concrete implementations of the Lumen rendering contracts.
//!
//! [`HeadlessBackend`] records every call without touching a GPU and is always
//! available. The `wgpu` feature adds [`WgpuBackend`], which renders into an
//! off-screen target through `wgpu`.

#![warn(missing_docs)]

pub mod graphics;

pub use graphics::headless::{BackendCall, HeadlessBackend};
#[cfg(feature = "wgpu")]
pub use graphics::wgpu::WgpuBackend;
