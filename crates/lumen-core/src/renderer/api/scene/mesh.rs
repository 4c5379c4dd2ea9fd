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

//! Defines data structures for mesh representation.

use crate::{
    math::{Aabb, Mat4},
    renderer::api::resource::VertexBufferId,
};

/// A skeletal joint of a skinned submesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    /// Transforms a mesh-space vertex into the joint's bind space.
    pub bind_pose_inverse: Mat4,
    /// One animated joint transform per animation frame. Empty when the joint is not animated.
    pub anim_transforms: Vec<Mat4>,
}

impl Joint {
    /// Returns the animated transform for `frame`, wrapping around the clip length.
    ///
    /// Returns `None` for a joint without animation data.
    pub fn anim_transform(&self, frame: usize) -> Option<&Mat4> {
        if self.anim_transforms.is_empty() {
            return None;
        }
        self.anim_transforms.get(frame % self.anim_transforms.len())
    }
}

/// A contiguous range of geometry drawn with a single material.
#[derive(Debug, Clone, PartialEq)]
pub struct SubMesh {
    /// The uploaded vertex/index buffer pair.
    pub vertex_buffer: VertexBufferId,
    /// Number of indices; three per triangle.
    pub index_count: u32,
    /// Local-space bounds.
    pub aabb: Aabb,
    /// Skeletal joints, empty for rigid geometry.
    pub joints: Vec<Joint>,
}

impl SubMesh {
    /// Creates a rigid submesh.
    pub fn new(vertex_buffer: VertexBufferId, index_count: u32, aabb: Aabb) -> Self {
        Self {
            vertex_buffer,
            index_count,
            aabb,
            joints: Vec::new(),
        }
    }

    /// Attaches skeletal joints to the submesh.
    pub fn with_joints(mut self, joints: Vec<Joint>) -> Self {
        self.joints = joints;
        self
    }

    /// Number of triangles in the submesh.
    pub fn face_count(&self) -> u32 {
        self.index_count / 3
    }

    /// Returns `true` if the submesh has skeletal joints.
    pub fn is_skinned(&self) -> bool {
        !self.joints.is_empty()
    }
}

/// An uploaded mesh: an ordered list of submeshes and their combined bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    sub_meshes: Vec<SubMesh>,
    aabb: Aabb,
}

impl Mesh {
    /// Creates a mesh whose bounds are the union of its submesh bounds.
    pub fn new(sub_meshes: Vec<SubMesh>) -> Self {
        let aabb = sub_meshes
            .iter()
            .fold(Aabb::INVALID, |acc, sub_mesh| acc.merge(&sub_mesh.aabb));
        Self { sub_meshes, aabb }
    }

    /// The submeshes, in draw order.
    pub fn sub_meshes(&self) -> &[SubMesh] {
        &self.sub_meshes
    }

    /// Local-space bounds of the whole mesh.
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }
}
