use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::device::WgpuDevice;
use crate::error::RttError;
use crate::gpu::GpuContext;
use crate::input::{Input, InputAction};
use crate::stage::{ShaderSources, Stage, StageConfig};

/// Configuration for the application window and the stage it runs.
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width in logical pixels.
    pub width: u32,
    /// Initial window height in logical pixels.
    pub height: u32,
    pub stage: StageConfig,
    pub shaders: ShaderSources,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "texchain".to_string(),
            width: 1280,
            height: 720,
            stage: StageConfig::default(),
            shaders: ShaderSources::default(),
        }
    }
}

impl AppConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the window title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the initial window size.
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn stage(mut self, stage: StageConfig) -> Self {
        self.stage = stage;
        self
    }

    /// Replace the bundled effect shaders.
    pub fn shaders(mut self, shaders: ShaderSources) -> Self {
        self.shaders = shaders;
        self
    }
}

/// Opens a window and runs the fluid field until it is closed.
///
/// Space pauses and resumes; dragging with the primary button stirs the
/// fluid and emits particles. While paused no frames are requested.
///
/// # Example
/// ```no_run
/// texchain::run(texchain::AppConfig::new().title("Fluid").size(960, 540))?;
/// # Ok::<(), texchain::RttError>(())
/// ```
///
/// # Errors
///
/// The first error raised while creating the window, the GPU context or the
/// stage, or while rendering a frame. The event loop exits on it.
pub fn run(config: AppConfig) -> Result<(), RttError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = TexchainApp {
        state: AppState::Pending { config },
        error: None,
    };
    event_loop.run_app(&mut app)?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

enum AppState {
    Pending {
        config: AppConfig,
    },
    Running {
        window: Arc<Window>,
        device: WgpuDevice,
        stage: Stage,
        input: Input,
    },
    Exited,
}

struct TexchainApp {
    state: AppState,
    error: Option<RttError>,
}

impl TexchainApp {
    fn start(config: &AppConfig, event_loop: &ActiveEventLoop) -> Result<AppState, RttError> {
        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));
        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .map_err(|e| RttError::InvalidContext(format!("failed to create window: {e}")))?,
        );

        let gpu = GpuContext::new(window.clone())?;
        let (width, height) = (gpu.width(), gpu.height());
        let mut device = WgpuDevice::new(gpu);

        let mut stage = Stage::fluid_field(width, height, &config.stage, &config.shaders);
        stage.initialize(&mut device)?;
        log::info!("running {} at {width}x{height}", stage.names().join(" -> "));

        window.request_redraw();
        Ok(AppState::Running {
            window,
            device,
            stage,
            input: Input::new(),
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: RttError) {
        log::error!("{err}");
        self.error.get_or_insert(err);
        self.state = AppState::Exited;
        event_loop.exit();
    }
}

impl ApplicationHandler for TexchainApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let AppState::Pending { config } = &self.state else {
            return;
        };
        match Self::start(config, event_loop) {
            Ok(running) => self.state = running,
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let AppState::Running {
            window,
            device,
            stage,
            input,
        } = &mut self.state
        else {
            return;
        };

        let result = match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
                Ok(())
            }
            WindowEvent::Resized(size) => {
                let resized = stage.resize(device, size.width, size.height);
                if !stage.is_paused() {
                    window.request_redraw();
                }
                resized
            }
            WindowEvent::RedrawRequested => {
                let ticked = stage.tick(device);
                if !stage.is_paused() {
                    window.request_redraw();
                }
                ticked
            }
            other => match input.handle_event(&other) {
                Some(InputAction::TogglePause) => {
                    if !stage.toggle_pause() {
                        window.request_redraw();
                    }
                    Ok(())
                }
                Some(InputAction::Pointer(pointer)) => stage.pointer(device, &pointer),
                None => Ok(()),
            },
        };

        if let Err(err) = result {
            self.fail(event_loop, err);
        }
    }
}
