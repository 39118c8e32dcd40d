use glam::{Mat4, Vec2, Vec3};
use log::{trace, warn};

use crate::error::RenderError;
use crate::geometry::PrimitiveId;
use crate::lights::SceneLights;
use crate::render::{RenderDevice, SceneMeshes};
use crate::scene::SceneObject;
use crate::shader::ProgramHandle;
use crate::texture::SceneTextures;

/// Where the renderer is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    Cleared,
    LitProgramBound,
    DrawingObjects,
    LampProgramBound,
    DrawingLights,
    Presented,
}

impl FrameState {
    fn can_advance_to(self, next: FrameState) -> bool {
        use FrameState::*;
        matches!(
            (self, next),
            (Idle, Cleared)
                | (Cleared, LitProgramBound)
                | (LitProgramBound, DrawingObjects)
                | (DrawingObjects, DrawingObjects)
                | (LitProgramBound | DrawingObjects, LampProgramBound)
                | (LampProgramBound, DrawingLights)
                | (DrawingLights, LampProgramBound)
                | (LitProgramBound | DrawingObjects | DrawingLights, Presented)
                | (Presented, Idle)
        )
    }
}

/// Camera matrices for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameView {
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
}

/// Everything the renderer draws, borrowed from the owning context.
#[derive(Debug, Clone, Copy)]
pub struct SceneDraw<'a> {
    pub objects: &'a [SceneObject],
    pub meshes: &'a SceneMeshes,
    pub textures: &'a SceneTextures,
    pub lights: &'a SceneLights,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub object_draws: u32,
    pub light_draws: u32,
    pub vertices: u64,
}

impl FrameStats {
    pub fn draw_calls(&self) -> u32 {
        self.object_draws + self.light_draws
    }
}

/// Issues the per-frame command sequence: clear, lit objects, then lamp markers.
#[derive(Debug)]
pub struct FrameRenderer {
    lit: ProgramHandle,
    clear_color: [f32; 4],
    uv_scale: Vec2,
    state: FrameState,
}

impl FrameRenderer {
    pub fn new(lit: ProgramHandle, clear_color: [f32; 4], uv_scale: Vec2) -> Self {
        Self {
            lit,
            clear_color,
            uv_scale,
            state: FrameState::Idle,
        }
    }

    pub fn lit_program(&self) -> ProgramHandle {
        self.lit
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn render_frame<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        scene: &SceneDraw<'_>,
        view: &FrameView,
    ) -> Result<FrameStats, RenderError> {
        let mut stats = FrameStats::default();

        device.clear(self.clear_color);
        self.advance(FrameState::Cleared);

        device.use_program(self.lit);
        device.set_uniform(self.lit, "view", view.view.into());
        device.set_uniform(self.lit, "projection", view.projection.into());
        device.set_uniform(self.lit, "viewPosition", view.camera_position.into());
        device.set_uniform(self.lit, "uvScale", self.uv_scale.into());
        scene.lights.bind_uniforms(device, self.lit);
        self.advance(FrameState::LitProgramBound);

        for object in scene.objects {
            let Some(mesh) = scene.meshes.get(object.primitive) else {
                warn!("no mesh uploaded for {}; skipping {}", object.primitive, object.name);
                continue;
            };
            let model = object.model_matrix();
            device.bind_mesh(mesh);
            device.set_uniform(self.lit, "model", model.into());
            device.set_uniform(self.lit, "normalMatrix", model.inverse().transpose().into());
            device.bind_texture(scene.textures.get(object.texture));
            device.draw_triangles(mesh.vertex_count);
            self.advance(FrameState::DrawingObjects);
            stats.object_draws += 1;
            stats.vertices += u64::from(mesh.vertex_count);
        }

        match scene.meshes.get(PrimitiveId::LightMarker) {
            Some(marker) => {
                for (light, program) in scene.lights.markers() {
                    let Some(program) = program else {
                        continue;
                    };
                    device.use_program(program);
                    device.set_uniform(program, "view", view.view.into());
                    device.set_uniform(program, "projection", view.projection.into());
                    self.advance(FrameState::LampProgramBound);

                    device.bind_mesh(marker);
                    device.set_uniform(program, "model", light.marker_model().into());
                    device.draw_triangles(marker.vertex_count);
                    self.advance(FrameState::DrawingLights);
                    stats.light_draws += 1;
                    stats.vertices += u64::from(marker.vertex_count);
                }
            }
            None => warn!("no light marker mesh; lamps are not drawn"),
        }

        let presented = device.present();
        self.advance(FrameState::Presented);
        self.advance(FrameState::Idle);
        presented.map(|()| stats)
    }

    fn advance(&mut self, next: FrameState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid frame transition {:?} -> {next:?}",
            self.state
        );
        trace!("frame state {:?} -> {next:?}", self.state);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_frame_order() {
        use FrameState::*;
        assert!(Idle.can_advance_to(Cleared));
        assert!(Cleared.can_advance_to(LitProgramBound));
        assert!(DrawingObjects.can_advance_to(DrawingObjects));
        assert!(DrawingLights.can_advance_to(LampProgramBound));
        assert!(Presented.can_advance_to(Idle));

        assert!(!Idle.can_advance_to(DrawingObjects));
        assert!(!DrawingLights.can_advance_to(DrawingObjects));
        assert!(!Cleared.can_advance_to(Presented));
    }

    #[test]
    fn draw_calls_sum_objects_and_lights() {
        let stats = FrameStats {
            object_draws: 10,
            light_draws: 5,
            vertices: 0,
        };
        assert_eq!(stats.draw_calls(), 15);
    }
}
