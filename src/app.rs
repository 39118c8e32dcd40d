use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Result};
use glam::{Vec2, Vec3};
use log::{debug, info};

use crate::camera::{Camera, ProjectionMode};
use crate::error::RenderError;
use crate::geometry::GeometryCatalog;
use crate::input::{InputController, KeyCode};
use crate::lights::SceneLights;
use crate::render::shared::{
    lamp_fragment_source, lamp_vertex_source, lit_fragment_source, lit_vertex_source,
};
use crate::render::{FrameRenderer, FrameStats, FrameView, RenderDevice, SceneDraw, SceneMeshes};
use crate::scene::{SceneObject, STILL_LIFE};
use crate::shader::compile_and_link;
use crate::texture::{SceneTextures, SlotStatus, TextureSet, TextureSlot};

/// Startup settings for the viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub assets_dir: PathBuf,
    pub clear_color: [f32; 4],
    pub uv_scale: Vec2,
    /// Orthographic half-extents are the viewport size divided by this.
    pub ortho_divisor: f32,
    pub camera_position: Vec3,
    pub camera_yaw: f32,
    pub camera_pitch: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Still Life Viewer".into(),
            width: 800,
            height: 600,
            assets_dir: PathBuf::from("assets"),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            uv_scale: Vec2::ONE,
            ortho_divisor: 50.0,
            camera_position: Vec3::new(0.0, 30.0, 40.0),
            camera_yaw: -90.0,
            camera_pitch: -30.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub assets: Option<PathBuf>,
    pub summary_only: bool,
}

impl CliOptions {
    pub fn parse() -> Result<Self> {
        Self::from_args(env::args().skip(1))
    }

    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => options.summary_only = true,
                "--assets" => {
                    let Some(dir) = args.next() else {
                        return Err(anyhow!("--assets expects a directory"));
                    };
                    options.assets = Some(PathBuf::from(dir));
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Usage: still-life-viewer [--assets <dir>] [--summary-only]"
                    ));
                }
            }
        }
        Ok(options)
    }

    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.assets {
            config.assets_dir = dir.clone();
        }
    }
}

/// Seconds elapsed between successive frames.
#[derive(Debug, Default)]
pub struct FrameClock {
    last: Option<Instant>,
}

impl FrameClock {
    /// Returns the time since the previous tick; the first tick returns zero.
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f32 {
        match self.last.replace(now) {
            Some(previous) => now.saturating_duration_since(previous).as_secs_f32(),
            None => 0.0,
        }
    }
}

/// One line of the texture load report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureReport {
    pub slot: TextureSlot,
    pub outcome: Result<(u32, u32, u8), String>,
}

/// Owns the device and everything created on it for the lifetime of the viewer.
pub struct AppContext<D: RenderDevice> {
    device: D,
    config: AppConfig,
    camera: Camera,
    input: InputController,
    objects: &'static [SceneObject],
    meshes: SceneMeshes,
    textures: SceneTextures,
    texture_report: Vec<TextureReport>,
    lights: SceneLights,
    renderer: FrameRenderer,
    last_stats: FrameStats,
}

impl<D: RenderDevice> AppContext<D> {
    /// Links both programs, uploads every mesh and texture and creates the
    /// lamp program instances. On failure whatever was created is released.
    pub fn startup(mut device: D, config: AppConfig) -> Result<Self, RenderError> {
        let lit_vertex = lit_vertex_source();
        let lit_fragment = lit_fragment_source();
        let lit = compile_and_link("lit", &lit_vertex, &lit_fragment)?;
        let lamp = compile_and_link("lamp", lamp_vertex_source(), lamp_fragment_source())?;
        info!(
            "linked lit ({} uniforms) and lamp ({} uniforms) programs",
            lit.uniforms().len(),
            lamp.uniforms().len()
        );

        let lit = device.create_program(lit)?;

        let catalog = GeometryCatalog::still_life();
        let mut meshes = match SceneMeshes::upload(&mut device, &catalog) {
            Ok(meshes) => meshes,
            Err(err) => {
                device.destroy_program(lit);
                return Err(err);
            }
        };

        let set = TextureSet::load(&config.assets_dir);
        let texture_report = TextureSlot::ALL
            .into_iter()
            .map(|slot| TextureReport {
                slot,
                outcome: match set.status(slot) {
                    Some(SlotStatus::Loaded(image)) => {
                        Ok((image.width, image.height, image.channels))
                    }
                    Some(SlotStatus::Failed(err)) => Err(err.to_string()),
                    None => Err("not loaded".into()),
                },
            })
            .collect();
        let mut textures = SceneTextures::upload(&mut device, &set);
        info!(
            "{} of {} textures available from {}",
            textures.len(),
            TextureSlot::ALL.len(),
            set.root().display()
        );
        drop(set);

        let mut lights = SceneLights::still_life();
        if let Err(err) = lights.create_programs(&mut device, &lamp) {
            for (_, program) in lights.markers() {
                if let Some(program) = program {
                    device.destroy_program(program);
                }
            }
            textures.destroy(&mut device);
            meshes.destroy(&mut device);
            device.destroy_program(lit);
            return Err(err);
        }

        let camera =
            Camera::with_angles(config.camera_position, config.camera_yaw, config.camera_pitch);
        let renderer = FrameRenderer::new(lit, config.clear_color, config.uv_scale);

        Ok(Self {
            device,
            config,
            camera,
            input: InputController::new(),
            objects: &STILL_LIFE,
            meshes,
            textures,
            texture_report,
            lights,
            renderer,
            last_stats: FrameStats::default(),
        })
    }

    /// Applies held keys for `dt` seconds and renders one frame.
    pub fn frame(&mut self, dt: f32) -> Result<FrameStats, RenderError> {
        self.input.process_held_keys(&mut self.camera, dt);

        let viewport = self.device.viewport_size();
        let view = FrameView {
            view: self.camera.view_matrix(),
            projection: self.input.projection().matrix(
                self.camera.zoom,
                viewport,
                self.config.ortho_divisor,
            ),
            camera_position: self.camera.position,
        };
        let scene = SceneDraw {
            objects: self.objects,
            meshes: &self.meshes,
            textures: &self.textures,
            lights: &self.lights,
        };
        let stats = self.renderer.render_frame(&mut self.device, &scene, &view)?;
        self.last_stats = stats;
        Ok(stats)
    }

    pub fn on_key(&mut self, key: KeyCode, pressed: bool) {
        self.input.on_key(key, pressed);
    }

    pub fn on_cursor_move(&mut self, x: f32, y: f32) {
        self.input.on_cursor_move(&mut self.camera, x, y);
    }

    pub fn on_scroll(&mut self, dy: f32) {
        self.input.on_scroll(&mut self.camera, dy);
        debug!("movement speed now {:.1}", self.camera.movement_speed());
    }

    pub fn reset_input(&mut self) {
        self.input.reset();
    }

    pub fn close_requested(&self) -> bool {
        self.input.close_requested()
    }

    pub fn projection(&self) -> ProjectionMode {
        self.input.projection()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn lit_program(&self) -> crate::shader::ProgramHandle {
        self.renderer.lit_program()
    }

    pub fn lights(&self) -> &SceneLights {
        &self.lights
    }

    pub fn texture_report(&self) -> &[TextureReport] {
        &self.texture_report
    }

    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Writes the object table, lights, texture results and last frame's draw count.
    pub fn write_summary(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(
            out,
            "Loaded still life with {} objects ({} lights)",
            self.objects.len(),
            self.lights.len()
        )?;
        for object in self.objects {
            let vertices = self
                .meshes
                .get(object.primitive)
                .map_or(0, |mesh| mesh.vertex_count);
            writeln!(
                out,
                " - {} [{}] {} vertices, {}",
                object.name, object.primitive, vertices, object.texture
            )?;
        }

        writeln!(out, "Lights:")?;
        for (index, light) in self.lights.lights().enumerate() {
            let p = light.position;
            let c = light.color;
            writeln!(
                out,
                " - light {} pos=({:.2}, {:.2}, {:.2}) color=({:.2}, {:.2}, {:.2}) intensity={:.2} highlight={}",
                index + 1,
                p.x,
                p.y,
                p.z,
                c.x,
                c.y,
                c.z,
                light.intensity,
                light.highlight
            )?;
        }

        writeln!(out, "Textures:")?;
        for report in &self.texture_report {
            match &report.outcome {
                Ok((width, height, channels)) => writeln!(
                    out,
                    " - {}: loaded {width}x{height} ({channels} channels)",
                    report.slot
                )?,
                Err(reason) => writeln!(out, " - {}: untextured ({reason})", report.slot)?,
            }
        }

        writeln!(
            out,
            "Frame: {} draw calls ({} objects, {} lights, {} vertices)",
            self.last_stats.draw_calls(),
            self.last_stats.object_draws,
            self.last_stats.light_draws,
            self.last_stats.vertices
        )
    }

    /// Releases every resource exactly once and hands the device back.
    pub fn shutdown(mut self) -> D {
        self.lights.destroy(&mut self.device);
        self.textures.destroy(&mut self.device);
        self.meshes.destroy(&mut self.device);
        self.device.destroy_program(self.renderer.lit_program());
        info!("released scene resources");
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn cli_defaults_to_interactive() {
        let options = CliOptions::from_args(args(&[])).unwrap();
        assert_eq!(options, CliOptions::default());
    }

    #[test]
    fn cli_reads_assets_and_summary_flag() {
        let options =
            CliOptions::from_args(args(&["--assets", "textures", "--summary-only"])).unwrap();
        assert!(options.summary_only);
        let mut config = AppConfig::default();
        options.apply(&mut config);
        assert_eq!(config.assets_dir, PathBuf::from("textures"));
    }

    #[test]
    fn cli_rejects_unknown_and_incomplete_arguments() {
        let err = CliOptions::from_args(args(&["--fullscreen"])).unwrap_err();
        assert!(err.to_string().contains("Unknown argument: --fullscreen"));
        assert!(CliOptions::from_args(args(&["--assets"])).is_err());
    }

    #[test]
    fn default_config_matches_the_scene_setup() {
        let config = AppConfig::default();
        assert_eq!(config.title, "Still Life Viewer");
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.ortho_divisor, 50.0);
        assert_eq!(config.camera_position, Vec3::new(0.0, 30.0, 40.0));
    }

    #[test]
    fn frame_clock_measures_between_ticks() {
        let mut clock = FrameClock::default();
        let start = Instant::now();
        assert_eq!(clock.tick_at(start), 0.0);
        let dt = clock.tick_at(start + Duration::from_millis(250));
        assert!((dt - 0.25).abs() < 1e-6);
    }
}
