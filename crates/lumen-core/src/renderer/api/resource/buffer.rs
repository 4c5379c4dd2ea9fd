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

//! Texel buffers and frame fences.

use std::borrow::Cow;

/// The element format of a texel buffer, as seen by shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    /// One 32-bit unsigned integer per element.
    R32Uint,
    /// Four 32-bit floats per element.
    Rgba32Float,
}

impl TexelFormat {
    /// Size of one element in bytes.
    pub const fn element_size(self) -> u64 {
        match self {
            TexelFormat::R32Uint => 4,
            TexelFormat::Rgba32Float => 16,
        }
    }
}

/// Describes a GPU buffer that shaders read and write element-wise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TexelBufferDescriptor {
    /// A debug label for the buffer.
    pub label: Option<Cow<'static, str>>,
    /// Size of the buffer in bytes.
    pub size: u64,
    /// Element format.
    pub format: TexelFormat,
}

/// A value signalled on the device timeline when submitted work completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FenceValue(pub u64);
