use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowId};

use still_life_viewer::{
    AppConfig, AppContext, CliOptions, FrameClock, HeadlessDevice, KeyCode, NamedKey, RenderError,
    WgpuDevice,
};

/// Scroll distance of one wheel notch on touchpads reporting pixels.
const PIXELS_PER_LINE: f64 = 20.0;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let mut config = AppConfig::default();
    options.apply(&mut config);

    if options.summary_only {
        run_summary(config)
    } else {
        run_interactive(config)
    }
}

fn run_summary(config: AppConfig) -> Result<()> {
    let device = HeadlessDevice::new(config.width, config.height);
    let mut app = AppContext::startup(device, config).context("failed to build the scene")?;
    app.frame(0.0).context("failed to render the summary frame")?;
    app.write_summary(&mut io::stdout().lock())?;
    app.shutdown();
    Ok(())
}

fn run_interactive(config: AppConfig) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| RenderError::window_init("event loop", panic_message(panic)))?
        .map_err(|err| RenderError::window_init("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut viewer = Viewer {
        config: Some(config),
        app: None,
        clock: FrameClock::default(),
        error: None,
    };
    event_loop
        .run_app(&mut viewer)
        .context("event loop terminated abnormally")?;

    if let Some(app) = viewer.app.take() {
        app.shutdown();
    }
    match viewer.error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

struct Viewer {
    config: Option<AppConfig>,
    app: Option<AppContext<WgpuDevice>>,
    clock: FrameClock,
    error: Option<RenderError>,
}

impl Viewer {
    fn start(&mut self, event_loop: &ActiveEventLoop, config: AppConfig) -> Result<(), RenderError> {
        let attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(LogicalSize::new(config.width, config.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| RenderError::window_init("window", err))?,
        );

        let device = block_on(WgpuDevice::new(window))?;
        let app = AppContext::startup(device, config)?;
        info!("scene ready; W/A/S/D/E/Q move, P toggles projection, Esc quits");
        self.app = Some(app);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: RenderError) {
        error!("{err}");
        self.error = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(config) = self.config.take() else {
            return;
        };
        if let Err(err) = self.start(event_loop, config) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(app) = self.app.as_mut() else {
            return;
        };
        if window_id != app.device().window_id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => app.device_mut().resize(size),
            WindowEvent::Focused(false) => app.reset_input(),
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                if let Some(key) = map_keycode(code) {
                    app.on_key(key, event.state == ElementState::Pressed);
                }
                if app.close_requested() {
                    event_loop.exit();
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                app.on_cursor_move(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let dy = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => (position.y / PIXELS_PER_LINE) as f32,
                };
                app.on_scroll(dy);
            }
            WindowEvent::RedrawRequested => {
                let dt = self.clock.tick();
                if let Err(err) = app.frame(dt) {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(app) = &self.app {
            app.device().window().request_redraw();
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

fn map_keycode(code: winit::keyboard::KeyCode) -> Option<KeyCode> {
    use winit::keyboard::KeyCode as Key;
    Some(match code {
        Key::Escape => KeyCode::Named(NamedKey::Escape),
        Key::KeyW => KeyCode::Character('W'),
        Key::KeyA => KeyCode::Character('A'),
        Key::KeyS => KeyCode::Character('S'),
        Key::KeyD => KeyCode::Character('D'),
        Key::KeyE => KeyCode::Character('E'),
        Key::KeyQ => KeyCode::Character('Q'),
        Key::KeyP => KeyCode::Character('P'),
        _ => return None,
    })
}
