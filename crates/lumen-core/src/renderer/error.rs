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

//! Defines the hierarchy of error types for the rendering subsystem.
//!
//! Every error here is fatal to the frame that produced it: backends log the
//! failure and return it, and the caller has no recovery path beyond tearing
//! the renderer down. Soft failures (a missing material, an out-of-range
//! texture slot or light index) are not errors and never surface here.

use crate::renderer::api::pipeline::PipelineStateId;
use crate::renderer::api::resource::ShaderStageId;
use std::fmt;

/// An error related to a shader program handed to the rendering core.
#[derive(Debug)]
pub enum ShaderError {
    /// The program is missing at least one compiled stage.
    InvalidProgram {
        /// A descriptive label for the program.
        label: String,
    },
    /// A compiled stage referenced by a program is unknown to the backend.
    StageNotFound {
        /// The ID of the stage that was not found.
        id: ShaderStageId,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::InvalidProgram { label } => {
                write!(f, "Shader program '{label}' has no valid vertex/pixel stage pair")
            }
            ShaderError::StageNotFound { id } => {
                write!(f, "Shader stage not found for ID: {id:?}")
            }
        }
    }
}

impl std::error::Error for ShaderError {}

/// An error related to the creation or use of a pipeline state object.
#[derive(Debug)]
pub enum PipelineError {
    /// The backend failed to compile the pipeline state object.
    CompilationFailed {
        /// A descriptive label for the pipeline, if available.
        label: Option<String>,
        /// Detailed error messages from the backend.
        details: String,
    },
    /// A draw was issued with a shader program that is not valid.
    InvalidShaderProgram(ShaderError),
    /// The specified pipeline state ID is not known to the backend.
    InvalidPipelineState {
        /// The ID of the invalid pipeline state.
        id: PipelineStateId,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::CompilationFailed { label, details } => {
                write!(
                    f,
                    "Pipeline compilation failed for '{}': {}",
                    label.as_deref().unwrap_or("Unknown"),
                    details
                )
            }
            PipelineError::InvalidShaderProgram(err) => {
                write!(f, "Cannot build a pipeline state: {err}")
            }
            PipelineError::InvalidPipelineState { id } => {
                write!(f, "Invalid pipeline state ID: {id:?}")
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::InvalidShaderProgram(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for PipelineError {
    fn from(err: ShaderError) -> Self {
        PipelineError::InvalidShaderProgram(err)
    }
}

/// An error related to the creation or use of a GPU resource.
#[derive(Debug)]
pub enum ResourceError {
    /// A pipeline-specific error occurred.
    Pipeline(PipelineError),
    /// A generic resource could not be found.
    NotFound,
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
    /// An attempt was made to access a resource out of its bounds (e.g., in a buffer).
    OutOfBounds,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Pipeline(err) => write!(f, "Pipeline resource error: {err}"),
            ResourceError::NotFound => write!(f, "Resource not found with ID."),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
            ResourceError::OutOfBounds => {
                write!(f, "Resource access out of bounds.")
            }
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        ResourceError::Pipeline(err)
    }
}

/// A high-level error raised by the graphics device or one of its clients.
#[derive(Debug)]
pub enum RenderError {
    /// A failure occurred during the initialization of the graphics backend.
    InitializationFailed(String),
    /// A critical, unrecoverable rendering operation failed.
    RenderingFailed(String),
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// The graphics device was removed (driver crash, GPU unplugged, ...).
    DeviceLost,
    /// The graphics device was reset by the driver.
    DeviceReset,
    /// An unexpected or internal error occurred.
    Internal(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::InitializationFailed(msg) => {
                write!(f, "Failed to initialize graphics backend: {msg}")
            }
            RenderError::RenderingFailed(msg) => {
                write!(f, "A critical rendering operation failed: {msg}")
            }
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::DeviceLost => write!(f, "The graphics device was removed."),
            RenderError::DeviceReset => write!(f, "The graphics device was reset."),
            RenderError::Internal(msg) => {
                write!(f, "An internal or unexpected error occurred: {msg}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

impl From<PipelineError> for RenderError {
    fn from(err: PipelineError) -> Self {
        RenderError::ResourceError(ResourceError::Pipeline(err))
    }
}
