//! Forward renderer for a small table-top still life.
//!
//! The crate is split so the frame loop can run without a window: everything
//! talks to a [`RenderDevice`], implemented by the wgpu backend
//! ([`WgpuDevice`]) and by a recording [`HeadlessDevice`] used for summaries
//! and tests.

pub mod app;
pub mod camera;
pub mod error;
pub mod geometry;
pub mod input;
pub mod lights;
pub mod render;
pub mod scene;
pub mod shader;
pub mod texture;

pub use app::{AppConfig, AppContext, CliOptions, FrameClock};
pub use camera::{Camera, CameraMovement, ProjectionMode};
pub use error::RenderError;
pub use geometry::{GeometryCatalog, PrimitiveId, VertexLayout};
pub use input::{InputController, InputState, KeyCode, NamedKey};
pub use lights::{PointLight, SceneLights};
pub use render::{DrawCommand, FrameRenderer, HeadlessDevice, RenderDevice, WgpuDevice};
pub use scene::{SceneObject, TransformRecipe, STILL_LIFE};
pub use shader::{compile_and_link, LinkedProgram, ProgramHandle, ShaderStage, UniformValue};
pub use texture::{TextureImage, TextureSlot};
