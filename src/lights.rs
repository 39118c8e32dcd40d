use glam::{Mat4, Vec3};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::render::RenderDevice;
use crate::shader::{LinkedProgram, ProgramHandle};

pub const LIGHT_COUNT: usize = 5;

/// A point light and the size of the marker cube drawn at its position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub highlight: f32,
    pub marker_scale: Vec3,
}

impl PointLight {
    pub fn marker_model(&self) -> Mat4 {
        Mat4::from_translation(self.position) * Mat4::from_scale(self.marker_scale)
    }
}

/// Uniform names a light is uploaded under in the lit program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightUniformNames {
    pub color: String,
    pub position: String,
    pub intensity: String,
    pub highlight: String,
}

impl LightUniformNames {
    /// Names for the light at zero-based `index`; the shader numbers lights from 1.
    pub fn for_index(index: usize) -> Self {
        let n = index + 1;
        Self {
            color: format!("lightColor{n}"),
            position: format!("lightPos{n}"),
            intensity: format!("lightIntensity{n}"),
            highlight: format!("highlightSize{n}"),
        }
    }
}

#[derive(Debug)]
struct LightEntry {
    light: PointLight,
    names: LightUniformNames,
    program: Option<ProgramHandle>,
}

/// The fixed, ordered set of scene lights.
///
/// Each light owns a separate instance of the lamp program so markers can be
/// drawn with independent uniform state.
#[derive(Debug)]
pub struct SceneLights {
    entries: Vec<LightEntry>,
}

impl SceneLights {
    pub fn new(lights: [PointLight; LIGHT_COUNT]) -> Self {
        let entries = lights
            .into_iter()
            .enumerate()
            .map(|(index, light)| LightEntry {
                light,
                names: LightUniformNames::for_index(index),
                program: None,
            })
            .collect();
        Self { entries }
    }

    /// Two warm overhead lights on each side, plus a bright key light near the camera.
    pub fn still_life() -> Self {
        let dim = Vec3::new(0.33, 0.24, 0.3);
        let marker = Vec3::splat(0.1);
        Self::new([
            PointLight {
                position: Vec3::new(16.0, 20.0, -5.0),
                color: dim,
                intensity: 0.3,
                highlight: 256.0,
                marker_scale: marker,
            },
            PointLight {
                position: Vec3::new(8.0, 20.0, 5.0),
                color: dim,
                intensity: 0.1,
                highlight: 256.0,
                marker_scale: marker,
            },
            PointLight {
                position: Vec3::new(-8.0, 20.0, 5.0),
                color: dim,
                intensity: 0.1,
                highlight: 256.0,
                marker_scale: marker,
            },
            PointLight {
                position: Vec3::new(-16.0, 20.0, -5.0),
                color: Vec3::new(0.33, 0.24, 0.03),
                intensity: 0.3,
                highlight: 256.0,
                marker_scale: marker,
            },
            PointLight {
                position: Vec3::new(1.0, 5.0, 25.0),
                color: Vec3::new(0.82, 0.79, 0.74),
                intensity: 0.2,
                highlight: 2.0,
                marker_scale: Vec3::splat(0.3),
            },
        ])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lights(&self) -> impl Iterator<Item = &PointLight> {
        self.entries.iter().map(|entry| &entry.light)
    }

    /// Light descriptors paired with their lamp program, once created.
    pub fn markers(&self) -> impl Iterator<Item = (&PointLight, Option<ProgramHandle>)> {
        self.entries.iter().map(|entry| (&entry.light, entry.program))
    }

    /// Creates one lamp program instance per light.
    pub fn create_programs<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        lamp: &LinkedProgram,
    ) -> Result<(), RenderError> {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.program.is_some() {
                continue;
            }
            let handle = device.create_program(lamp.clone())?;
            debug!("light {} uses lamp {handle}", index + 1);
            entry.program = Some(handle);
        }
        Ok(())
    }

    /// Uploads every light's color, position, intensity and highlight to the lit program.
    pub fn bind_uniforms<D: RenderDevice + ?Sized>(&self, device: &mut D, lit: ProgramHandle) {
        for entry in &self.entries {
            let LightEntry { light, names, .. } = entry;
            device.set_uniform(lit, &names.color, light.color.into());
            device.set_uniform(lit, &names.position, light.position.into());
            device.set_uniform(lit, &names.intensity, light.intensity.into());
            device.set_uniform(lit, &names.highlight, light.highlight.into());
        }
    }

    /// Releases every lamp program. Calling it again is harmless.
    pub fn destroy<D: RenderDevice + ?Sized>(&mut self, device: &mut D) {
        for entry in &mut self.entries {
            match entry.program.take() {
                Some(handle) => device.destroy_program(handle),
                None => warn!("lamp program for {} already released", entry.names.color),
            }
        }
    }
}
