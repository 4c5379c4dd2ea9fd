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

//! Per-entity mesh rendering: culling state, skinning and draw dispatch.

use crate::math::{CullingVolume, Mat4};
use crate::renderer::api::*;
use crate::renderer::device::GraphicsDevice;
use crate::renderer::error::RenderError;
use crate::renderer::material::{BlendingMode, Material, MaterialGlobals};
use crate::renderer::traits::GraphicsBackend;
use std::sync::Arc;

/// Shader parameter receiving the skin matrix palette.
const BONE_MATRICES_PARAMETER: &str = "boneMatrices";

/// Number of components added to a [`MeshRendererPool`] when it runs out of slots.
pub const POOL_GROWTH: usize = 10;

/// Selects which submeshes a render call draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderType {
    /// Submeshes whose material does not blend.
    Opaque,
    /// Submeshes whose material blends.
    Transparent,
}

impl RenderType {
    fn accepts(self, blending_mode: BlendingMode) -> bool {
        match self {
            RenderType::Opaque => blending_mode == BlendingMode::Off,
            RenderType::Transparent => blending_mode != BlendingMode::Off,
        }
    }
}

/// The transforms of one entity for one camera and one shadow caster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTransforms {
    /// Object space to view space.
    pub local_to_view: Mat4,
    /// Object space to clip space.
    pub local_to_clip: Mat4,
    /// Object space to world space.
    pub local_to_world: Mat4,
    /// World space to the shadow caster's view space.
    pub shadow_view: Mat4,
    /// The shadow caster's projection.
    pub shadow_projection: Mat4,
}

impl Default for RenderTransforms {
    fn default() -> Self {
        Self {
            local_to_view: Mat4::IDENTITY,
            local_to_clip: Mat4::IDENTITY,
            local_to_world: Mat4::IDENTITY,
            shadow_view: Mat4::IDENTITY,
            shadow_projection: Mat4::IDENTITY,
        }
    }
}

/// Renders a [`Mesh`] with one material per submesh.
///
/// The material list and the per-submesh culling flags always have one
/// entry per submesh of the attached mesh.
#[derive(Debug, Clone)]
pub struct MeshRendererComponent {
    mesh: Option<Arc<Mesh>>,
    materials: Vec<Option<Arc<Material>>>,
    is_sub_mesh_culled: Vec<bool>,
    skin_palettes: Vec<Vec<Mat4>>,
    is_culled: bool,
    is_wireframe: bool,
    is_enabled: bool,
    animation_frame: usize,
}

impl Default for MeshRendererComponent {
    fn default() -> Self {
        Self {
            mesh: None,
            materials: Vec::new(),
            is_sub_mesh_culled: Vec::new(),
            skin_palettes: Vec::new(),
            is_culled: false,
            is_wireframe: false,
            is_enabled: true,
            animation_frame: 0,
        }
    }
}

impl MeshRendererComponent {
    /// Creates an enabled component without a mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a mesh and resizes the per-submesh arrays to match it.
    ///
    /// Existing materials keep their submesh index. `None` detaches the mesh
    /// and leaves the arrays as they are.
    pub fn set_mesh(&mut self, mesh: Option<Arc<Mesh>>) {
        self.mesh = mesh;

        let Some(mesh) = self.mesh.as_deref() else {
            return;
        };
        let sub_meshes = mesh.sub_meshes();
        self.materials.resize(sub_meshes.len(), None);
        self.is_sub_mesh_culled.resize(sub_meshes.len(), false);
        self.skin_palettes.resize_with(sub_meshes.len(), Vec::new);
        for (palette, sub_mesh) in self.skin_palettes.iter_mut().zip(sub_meshes) {
            palette.resize(sub_mesh.joints.len(), Mat4::IDENTITY);
        }
    }

    /// The attached mesh.
    pub fn mesh(&self) -> Option<&Arc<Mesh>> {
        self.mesh.as_ref()
    }

    /// Assigns the material of one submesh. Out-of-range indices are ignored.
    pub fn set_material(&mut self, material: Option<Arc<Material>>, sub_mesh_index: usize) {
        match self.materials.get_mut(sub_mesh_index) {
            Some(slot) => *slot = material,
            None => log::warn!(
                "Ignoring material for submesh {sub_mesh_index}; the mesh has {} submeshes.",
                self.materials.len()
            ),
        }
    }

    /// The material of one submesh.
    pub fn material(&self, sub_mesh_index: usize) -> Option<&Arc<Material>> {
        self.materials.get(sub_mesh_index).and_then(Option::as_ref)
    }

    /// One material entry per submesh.
    pub fn materials(&self) -> &[Option<Arc<Material>>] {
        &self.materials
    }

    /// One culling flag per submesh.
    pub fn sub_mesh_culled_flags(&self) -> &[bool] {
        &self.is_sub_mesh_culled
    }

    /// Returns `true` if the last [`cull`](Self::cull) rejected the whole entity.
    pub fn is_culled(&self) -> bool {
        self.is_culled
    }

    /// Enables or disables rendering.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.is_enabled = enabled;
    }

    /// Returns `true` if the component renders.
    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    /// Draws polygon edges only when `enable` is set.
    pub fn set_wireframe(&mut self, enable: bool) {
        self.is_wireframe = enable;
    }

    /// Returns `true` if the component draws in wireframe.
    pub fn is_wireframe(&self) -> bool {
        self.is_wireframe
    }

    /// Sets the animation frame used to sample joint transforms.
    pub fn set_animation_frame(&mut self, frame: usize) {
        self.animation_frame = frame;
    }

    /// Advances the animation frame by one.
    pub fn advance_animation_frame(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// The current animation frame.
    pub fn animation_frame(&self) -> usize {
        self.animation_frame
    }

    /// The skin matrices last bound for one submesh.
    pub fn skin_palette(&self, sub_mesh_index: usize) -> &[Mat4] {
        self.skin_palettes
            .get(sub_mesh_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Updates the culling flags against `frustum`.
    ///
    /// When the whole mesh is outside the frustum only the entity flag is
    /// set and the submesh flags keep their previous values.
    pub fn cull(&mut self, frustum: &impl CullingVolume, local_to_world: &Mat4) {
        let Some(mesh) = self.mesh.as_deref() else {
            return;
        };

        self.is_culled = false;

        if !frustum.intersects_aabb(&mesh.aabb().transformed_by(local_to_world)) {
            self.is_culled = true;
            return;
        }

        for (index, sub_mesh) in mesh.sub_meshes().iter().enumerate() {
            let has_valid_material = self.materials[index]
                .as_ref()
                .is_some_and(|material| material.is_valid_shader());

            self.is_sub_mesh_culled[index] = !has_valid_material
                || !frustum.intersects_aabb(&sub_mesh.aabb.transformed_by(local_to_world));
        }
    }

    /// Draws every visible submesh whose material belongs to `render_type`.
    ///
    /// With an override shader only the clip and view transforms are
    /// uploaded and the material's own parameters are skipped.
    ///
    /// # Errors
    /// Propagates any draw failure from the device.
    pub fn render<B: GraphicsBackend>(
        &mut self,
        device: &mut GraphicsDevice<B>,
        globals: &MaterialGlobals,
        transforms: &RenderTransforms,
        override_shader: Option<&ShaderProgram>,
        render_type: RenderType,
    ) -> Result<(), RenderError> {
        if self.is_culled || !self.is_enabled {
            return Ok(());
        }
        let Some(mesh) = self.mesh.clone() else {
            return Ok(());
        };

        let fill_mode = if self.is_wireframe {
            FillMode::Wireframe
        } else {
            FillMode::Solid
        };

        for (index, sub_mesh) in mesh.sub_meshes().iter().enumerate() {
            if self.is_sub_mesh_culled[index] {
                continue;
            }
            let Some(material) = self.materials[index].clone() else {
                continue;
            };
            if !render_type.accepts(material.blending_mode()) {
                continue;
            }

            let mut cull_mode = CullMode::Back;
            let mut blend_mode = BlendMode::Off;

            let shader = match override_shader {
                Some(shader) => {
                    device.use_shader(shader);
                    let uniforms = device.per_object_uniforms_mut();
                    uniforms.local_to_clip = transforms.local_to_clip;
                    uniforms.local_to_view = transforms.local_to_view;
                    shader
                }
                None => {
                    let Some(shader) = material.shader().filter(|shader| shader.is_valid())
                    else {
                        log::trace!(
                            "Submesh {index} has a material without a valid shader; skipping."
                        );
                        continue;
                    };

                    let mut local_to_shadow_clip = transforms.shadow_projection
                        * transforms.shadow_view
                        * transforms.local_to_world;
                    if let Some(bias) = device.shadow_clip_bias() {
                        local_to_shadow_clip = bias * local_to_shadow_clip;
                    }

                    material.apply(device, globals);

                    let uniforms = device.per_object_uniforms_mut();
                    uniforms.local_to_clip = transforms.local_to_clip;
                    uniforms.local_to_view = transforms.local_to_view;
                    uniforms.local_to_world = transforms.local_to_world;
                    uniforms.local_to_shadow_clip = local_to_shadow_clip;

                    if sub_mesh.is_skinned() {
                        let palette = &mut self.skin_palettes[index];
                        for (bone, joint) in palette.iter_mut().zip(&sub_mesh.joints) {
                            if let Some(anim) = joint.anim_transform(self.animation_frame) {
                                *bone = *anim * joint.bind_pose_inverse;
                            }
                        }
                        device.set_matrix_array(BONE_MATRICES_PARAMETER, palette);
                    }

                    if !material.back_face_culling() {
                        cull_mode = CullMode::Off;
                    }
                    if material.blending_mode() == BlendingMode::Alpha {
                        blend_mode = BlendMode::AlphaBlend;
                    }

                    shader.as_ref()
                }
            };

            device.draw(
                sub_mesh.vertex_buffer,
                0,
                sub_mesh.face_count(),
                shader,
                blend_mode,
                material.depth_function().into(),
                cull_mode,
                fill_mode,
                PrimitiveTopology::Triangles,
            )?;
        }

        Ok(())
    }
}

/// A stable index into a [`MeshRendererPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshRendererHandle(pub u32);

/// A growable arena of mesh renderer components.
///
/// Slots are never freed; handles stay valid for the lifetime of the pool.
#[derive(Debug, Default)]
pub struct MeshRendererPool {
    components: Vec<MeshRendererComponent>,
    next_free: usize,
}

impl MeshRendererPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next free component, growing the pool when it is full.
    pub fn new_component(&mut self) -> MeshRendererHandle {
        if self.next_free == self.components.len() {
            let capacity = self.components.len() + POOL_GROWTH;
            self.components
                .resize_with(capacity, MeshRendererComponent::default);
            log::debug!("Mesh renderer pool grown to {capacity} components.");
        }
        let handle = MeshRendererHandle(self.next_free as u32);
        self.next_free += 1;
        handle
    }

    /// Returns the component behind `handle`.
    pub fn get(&self, handle: MeshRendererHandle) -> Option<&MeshRendererComponent> {
        let index = handle.0 as usize;
        (index < self.next_free).then(|| &self.components[index])
    }

    /// Returns the component behind `handle` mutably.
    pub fn get_mut(&mut self, handle: MeshRendererHandle) -> Option<&mut MeshRendererComponent> {
        let index = handle.0 as usize;
        if index < self.next_free {
            self.components.get_mut(index)
        } else {
            None
        }
    }

    /// Restores the component behind `handle` to its default state.
    ///
    /// Returns `false` if the handle was never handed out.
    pub fn reset(&mut self, handle: MeshRendererHandle) -> bool {
        match self.get_mut(handle) {
            Some(component) => {
                *component = MeshRendererComponent::default();
                true
            }
            None => false,
        }
    }

    /// Number of components handed out.
    pub fn len(&self) -> usize {
        self.next_free
    }

    /// Returns `true` if no component was handed out.
    pub fn is_empty(&self) -> bool {
        self.next_free == 0
    }

    /// Number of allocated slots.
    pub fn capacity(&self) -> usize {
        self.components.len()
    }

    /// Iterates over the handed-out components.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MeshRendererComponent> {
        self.components.iter_mut().take(self.next_free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Aabb, Vec3};

    fn two_part_mesh() -> Arc<Mesh> {
        let aabb = Aabb::from_min_max(Vec3::splat(-1.0), Vec3::ONE);
        Arc::new(Mesh::new(vec![
            SubMesh::new(VertexBufferId(0), 36, aabb),
            SubMesh::new(VertexBufferId(1), 6, aabb),
        ]))
    }

    #[test]
    fn set_mesh_keeps_arrays_in_step() {
        let mesh = two_part_mesh();
        let mut component = MeshRendererComponent::new();
        component.set_mesh(Some(mesh.clone()));
        component.set_material(Some(Arc::new(Material::new())), 1);
        component.set_mesh(Some(mesh.clone()));

        assert_eq!(component.materials().len(), 2);
        assert_eq!(component.sub_mesh_culled_flags().len(), 2);
        assert!(component.material(1).is_some());

        component.set_mesh(None);
        assert!(component.mesh().is_none());
        assert_eq!(component.materials().len(), 2);
    }

    #[test]
    fn out_of_range_material_is_dropped() {
        let mut component = MeshRendererComponent::new();
        component.set_mesh(Some(two_part_mesh()));
        component.set_material(Some(Arc::new(Material::new())), 2);
        assert!(component.materials().iter().all(Option::is_none));
    }

    #[test]
    fn pool_grows_by_ten_and_resets_in_place() {
        let mut pool = MeshRendererPool::new();
        assert_eq!(pool.capacity(), 0);

        let first = pool.new_component();
        assert_eq!(first, MeshRendererHandle(0));
        assert_eq!(pool.capacity(), POOL_GROWTH);

        for _ in 1..POOL_GROWTH {
            pool.new_component();
        }
        assert_eq!(pool.capacity(), POOL_GROWTH);
        let eleventh = pool.new_component();
        assert_eq!(eleventh, MeshRendererHandle(10));
        assert_eq!(pool.capacity(), 2 * POOL_GROWTH);
        assert_eq!(pool.len(), 11);

        pool.get_mut(first).unwrap().set_wireframe(true);
        assert!(pool.reset(first));
        assert!(!pool.get(first).unwrap().is_wireframe());
        assert!(pool.get(MeshRendererHandle(11)).is_none());
        assert!(!pool.reset(MeshRendererHandle(15)));
    }
}
