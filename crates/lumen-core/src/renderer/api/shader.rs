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

//! Compiled shader programs handed to the core by the asset layer.

use crate::renderer::api::resource::{ComputeShaderId, ShaderStageId};
use std::borrow::Cow;

/// A linked vertex/pixel program.
///
/// A stage is `None` when it failed to compile; such a program is kept around
/// so materials can reference it, but nothing is ever drawn with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderProgram {
    /// A debug label, also used to label pipeline states built from this program.
    pub label: Option<Cow<'static, str>>,
    /// The compiled vertex stage.
    pub vertex: Option<ShaderStageId>,
    /// The compiled pixel stage.
    pub pixel: Option<ShaderStageId>,
}

impl ShaderProgram {
    /// Creates a program from two successfully compiled stages.
    pub fn new(
        label: impl Into<Cow<'static, str>>,
        vertex: ShaderStageId,
        pixel: ShaderStageId,
    ) -> Self {
        Self {
            label: Some(label.into()),
            vertex: Some(vertex),
            pixel: Some(pixel),
        }
    }

    /// Returns `true` if both stages compiled.
    pub fn is_valid(&self) -> bool {
        self.vertex.is_some() && self.pixel.is_some()
    }

    /// Returns both stages, or `None` if the program is invalid.
    pub fn stages(&self) -> Option<(ShaderStageId, ShaderStageId)> {
        Some((self.vertex?, self.pixel?))
    }
}

/// A compiled compute kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeShader {
    /// The backend handle.
    pub id: ComputeShaderId,
    /// A debug label.
    pub label: Option<Cow<'static, str>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_requires_both_stages() {
        let valid = ShaderProgram::new("lit", ShaderStageId(1), ShaderStageId(2));
        assert!(valid.is_valid());
        assert_eq!(valid.stages(), Some((ShaderStageId(1), ShaderStageId(2))));

        let broken = ShaderProgram {
            pixel: None,
            ..valid
        };
        assert!(!broken.is_valid());
        assert_eq!(broken.stages(), None);
    }
}
