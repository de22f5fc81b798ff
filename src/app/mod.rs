use color_eyre::eyre::eyre;
use color_eyre::{Report, Result};
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use crate::renderer::{RenderConfig, Scene};

pub const WINDOW_TITLE: &str = "texlit";

pub struct App {
    window: Option<Arc<Window>>,
    scene: Scene,
    config: RenderConfig,
    event_loop: Option<EventLoop<()>>,

    // State
    close_requested: bool,
    init_error: Option<Report>,
}

impl App {
    pub fn new(config: RenderConfig) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        // Render continuously rather than waiting for input
        event_loop.set_control_flow(ControlFlow::Poll);

        Ok(Self {
            window: None,
            scene: Scene::new(),
            config,
            event_loop: Some(event_loop),

            close_requested: false,
            init_error: None,
        })
    }

    /// Runs until the window closes. Returns the initialization error, if any.
    pub fn run(mut self) -> Result<()> {
        let event_loop = self.event_loop
            .take()
            .ok_or_else(|| eyre!("App has already been run"))?;
        event_loop.run_app(&mut self)?;

        self.scene.shutdown();
        match self.init_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn create_window(&self, event_loop: &ActiveEventLoop) -> Result<Arc<Window>> {
        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false);
        Ok(Arc::new(event_loop.create_window(attributes)?))
    }

    fn fail_initialization(&mut self, event_loop: &ActiveEventLoop, error: Report) {
        self.init_error = Some(error);
        self.close_requested = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match self.create_window(event_loop) {
            Ok(window) => window,
            Err(e) => {
                log::error!("Could not create the window: {:#}", e);
                self.fail_initialization(event_loop, e);
                return;
            }
        };
        self.window = Some(window.clone());

        if let Err(e) = self.scene.initialize(&self.config, window.clone()) {
            self.fail_initialization(event_loop, e);
            return;
        }
        window.request_redraw();
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        if self.window.as_ref().map(|w| w.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::RedrawRequested => {
                if self.close_requested {
                    return;
                }
                if let Err(e) = self.scene.frame() {
                    log::warn!("Dropped frame: {:#}", e);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: Key::Named(NamedKey::Escape),
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            self.scene.shutdown();
            event_loop.exit();
            return;
        }

        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.scene.shutdown();
    }
}
