use std::sync::Arc;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::{ElementState, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::device::{Gpu, GpuInit, GraphicsDevice, RecordingDevice, RenderApi, WgpuDevice};
use crate::input::{Key, Modifiers, MouseButton, NodeEvent};
use crate::scene::Display;
use crate::time::FrameClock;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "universe".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
        }
    }
}

/// Entry point for the windowed loop.
pub struct Runtime;

impl Runtime {
    /// Opens one window, starts `display` on it and drives it until the
    /// window closes. The display is shut down before returning.
    pub fn run(config: RuntimeConfig, gpu_init: GpuInit, display: Display) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config, gpu_init, display);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        state.finish()
    }
}

/// Window plus the per-window loop state.
struct WindowEntry {
    window: Arc<Window>,
    clock: FrameClock,
    modifiers: Modifiers,
    pointer: (f32, f32),
}

struct AppState {
    config: RuntimeConfig,
    gpu_init: GpuInit,
    display: Display,
    window: Option<WindowEntry>,
    failure: Option<anyhow::Error>,
    exit_requested: bool,
}

impl AppState {
    fn new(config: RuntimeConfig, gpu_init: GpuInit, display: Display) -> Self {
        Self {
            config,
            gpu_init,
            display,
            window: None,
            failure: None,
            exit_requested: false,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure.get_or_insert(err);
        self.exit_requested = true;
        event_loop.exit();
    }

    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let size = window.inner_size();
        self.display.resize(size.width, size.height);

        let device = self.build_device(&window)?;
        self.display
            .start(device)
            .context("failed to start the display")?;

        window.request_redraw();
        self.window = Some(WindowEntry {
            window,
            clock: FrameClock::default(),
            modifiers: Modifiers::default(),
            pointer: (0.0, 0.0),
        });
        Ok(())
    }

    fn build_device(&self, window: &Arc<Window>) -> Result<Box<dyn GraphicsDevice>> {
        match self.display.renderer() {
            RenderApi::Preferred | RenderApi::Wgpu => {
                let gpu = pollster::block_on(Gpu::new(window.clone(), self.gpu_init.clone()))
                    .context("GPU initialization failed for window")?;
                Ok(Box::new(WgpuDevice::new(gpu)))
            }
            RenderApi::Headless => {
                log::info!("headless renderer selected; the window stays blank");
                Ok(Box::new(RecordingDevice::new()))
            }
        }
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(entry) = self.window.as_mut() else {
            return Ok(());
        };
        let time = entry.clock.tick();
        self.display.update(time.dt).context("update failed")?;
        self.display.draw().context("draw failed")?;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        let shutdown = self.display.shutdown().context("display shutdown failed");
        match self.failure.take() {
            Some(err) => Err(err),
            None => shutdown,
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.exit_requested {
            return;
        }
        if let Err(err) = self.create_window(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw; nodes animate every frame.
        if let Some(entry) = &self.window {
            entry.window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }
        let Some(entry) = self.window.as_mut() else {
            return;
        };
        if entry.window.id() != window_id {
            return;
        }

        let node_event = translate_event(entry, &event);
        let window = entry.window.clone();

        if let Some(node_event) = node_event {
            if let Err(err) = self.display.dispatch(&node_event) {
                self.fail(event_loop, err.into());
                return;
            }
        }

        match &event {
            WindowEvent::CloseRequested => {
                self.exit_requested = true;
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                self.display.resize(size.width, size.height);
                window.request_redraw();
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                let size = window.inner_size();
                self.display.resize(size.width, size.height);
                window.request_redraw();
            }

            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err);
                }
            }

            _ => {}
        }
    }
}

/// Maps a window event to what nodes see. Also tracks modifiers and the
/// last pointer position, which button events need.
fn translate_event(entry: &mut WindowEntry, event: &WindowEvent) -> Option<NodeEvent> {
    match event {
        WindowEvent::ModifiersChanged(m) => {
            entry.modifiers = map_modifiers(m.state());
            None
        }

        WindowEvent::CursorMoved { position, .. } => {
            let (x, y) = to_logical_f32(&entry.window, *position);
            entry.pointer = (x, y);
            Some(NodeEvent::PointerMoved { x, y })
        }

        WindowEvent::MouseInput { state, button, .. } => {
            let button = map_mouse_button(*button);
            let (x, y) = entry.pointer;
            Some(match state {
                ElementState::Pressed => NodeEvent::PointerPressed { button, x, y },
                ElementState::Released => NodeEvent::PointerReleased { button, x, y },
            })
        }

        WindowEvent::MouseWheel { delta, .. } => {
            let (dx, dy) = match delta {
                MouseScrollDelta::LineDelta(x, y) => (*x, *y),
                MouseScrollDelta::PixelDelta(p) => {
                    let (x, y) = to_logical_f32(&entry.window, *p);
                    (x / 100.0, y / 100.0)
                }
            };
            Some(NodeEvent::Scrolled { dx, dy })
        }

        WindowEvent::KeyboardInput { event, .. } => {
            let key = map_key(event.physical_key);
            let modifiers = entry.modifiers;
            Some(match event.state {
                ElementState::Pressed => NodeEvent::KeyPressed {
                    key,
                    modifiers,
                    repeat: event.repeat,
                },
                ElementState::Released => NodeEvent::KeyReleased { key, modifiers },
            })
        }

        _ => None,
    }
}

fn to_logical_f32(window: &Window, pos: PhysicalPosition<f64>) -> (f32, f32) {
    let logical = pos.to_logical::<f64>(window.scale_factor());
    (logical.x as f32, logical.y as f32)
}

fn map_modifiers(m: ModifiersState) -> Modifiers {
    Modifiers {
        shift: m.shift_key(),
        ctrl: m.control_key(),
        alt: m.alt_key(),
        meta: m.super_key(),
    }
}

fn map_mouse_button(b: WinitMouseButton) -> MouseButton {
    match b {
        WinitMouseButton::Left => MouseButton::Left,
        WinitMouseButton::Right => MouseButton::Right,
        WinitMouseButton::Middle => MouseButton::Middle,
        WinitMouseButton::Back => MouseButton::Back,
        WinitMouseButton::Forward => MouseButton::Forward,
        WinitMouseButton::Other(v) => MouseButton::Other(v),
    }
}

fn map_key(pk: PhysicalKey) -> Key {
    let PhysicalKey::Code(code) = pk else {
        // NativeKeyCode has no stable numeric form.
        return Key::Unknown(0);
    };
    match code {
        KeyCode::Escape => Key::Escape,
        KeyCode::Enter => Key::Enter,
        KeyCode::Tab => Key::Tab,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Space => Key::Space,

        KeyCode::ArrowUp => Key::ArrowUp,
        KeyCode::ArrowDown => Key::ArrowDown,
        KeyCode::ArrowLeft => Key::ArrowLeft,
        KeyCode::ArrowRight => Key::ArrowRight,

        KeyCode::ShiftLeft | KeyCode::ShiftRight => Key::Shift,
        KeyCode::ControlLeft | KeyCode::ControlRight => Key::Control,
        KeyCode::AltLeft | KeyCode::AltRight => Key::Alt,
        KeyCode::SuperLeft | KeyCode::SuperRight => Key::Meta,

        KeyCode::KeyA => Key::A,
        KeyCode::KeyB => Key::B,
        KeyCode::KeyC => Key::C,
        KeyCode::KeyD => Key::D,
        KeyCode::KeyE => Key::E,
        KeyCode::KeyF => Key::F,
        KeyCode::KeyG => Key::G,
        KeyCode::KeyH => Key::H,
        KeyCode::KeyI => Key::I,
        KeyCode::KeyJ => Key::J,
        KeyCode::KeyK => Key::K,
        KeyCode::KeyL => Key::L,
        KeyCode::KeyM => Key::M,
        KeyCode::KeyN => Key::N,
        KeyCode::KeyO => Key::O,
        KeyCode::KeyP => Key::P,
        KeyCode::KeyQ => Key::Q,
        KeyCode::KeyR => Key::R,
        KeyCode::KeyS => Key::S,
        KeyCode::KeyT => Key::T,
        KeyCode::KeyU => Key::U,
        KeyCode::KeyV => Key::V,
        KeyCode::KeyW => Key::W,
        KeyCode::KeyX => Key::X,
        KeyCode::KeyY => Key::Y,
        KeyCode::KeyZ => Key::Z,

        KeyCode::Digit0 => Key::Digit0,
        KeyCode::Digit1 => Key::Digit1,
        KeyCode::Digit2 => Key::Digit2,
        KeyCode::Digit3 => Key::Digit3,
        KeyCode::Digit4 => Key::Digit4,
        KeyCode::Digit5 => Key::Digit5,
        KeyCode::Digit6 => Key::Digit6,
        KeyCode::Digit7 => Key::Digit7,
        KeyCode::Digit8 => Key::Digit8,
        KeyCode::Digit9 => Key::Digit9,

        other => Key::Unknown(other as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_and_sides_collapse() {
        assert_eq!(map_key(PhysicalKey::Code(KeyCode::KeyQ)), Key::Q);
        assert_eq!(map_key(PhysicalKey::Code(KeyCode::ShiftRight)), Key::Shift);
        assert!(matches!(map_key(PhysicalKey::Code(KeyCode::F13)), Key::Unknown(_)));
    }

    #[test]
    fn modifiers_map_one_to_one() {
        let m = map_modifiers(ModifiersState::SHIFT | ModifiersState::SUPER);
        assert_eq!(
            m,
            Modifiers {
                shift: true,
                ctrl: false,
                alt: false,
                meta: true,
            }
        );
    }
}
