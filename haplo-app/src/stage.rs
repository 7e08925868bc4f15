use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use haplo_core::Viewport;
use haplo_input::{KeyPress, KeyboardDevice};
use haplo_render::{DisplaySurface, EyeCanvas, RenderError};
use haplo_timing::{HighPrecisionTimer, Timer};
use pixels::{Pixels, SurfaceTexture};
use tracing::{debug, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, NamedKey},
    monitor::MonitorHandle,
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Fullscreen, Window, WindowId},
};

const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// A window to open on start-up.
#[derive(Debug, Clone)]
pub struct WindowPlan {
    pub title: String,
    pub monitor: usize,
    pub size: [u32; 2],
    pub fullscreen: bool,
    /// Number of eye surfaces drawing into this window.
    pub eyes: usize,
}

struct StageWindow {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    size: [u32; 2],
    eyes: usize,
    flipped: usize,
    closed: usize,
}

struct StageHandler {
    plan: Vec<WindowPlan>,
    windows: Vec<Option<StageWindow>>,
    keys: VecDeque<KeyPress>,
    timer: HighPrecisionTimer,
    close_key: String,
    error: Option<anyhow::Error>,
}

impl StageHandler {
    fn pick_monitor(event_loop: &ActiveEventLoop, index: usize) -> Option<MonitorHandle> {
        event_loop.available_monitors().nth(index).or_else(|| {
            warn!("monitor {} not found; using the primary monitor", index);
            event_loop
                .primary_monitor()
                .or_else(|| event_loop.available_monitors().next())
        })
    }

    fn create_window(
        &self,
        event_loop: &ActiveEventLoop,
        plan: &WindowPlan,
    ) -> Result<StageWindow> {
        let monitor = Self::pick_monitor(event_loop, plan.monitor)
            .ok_or_else(|| anyhow!("No monitor available"))?;
        if let Some(rate) = monitor.refresh_rate_millihertz() {
            info!(
                "{}: monitor {} at {:.1} Hz",
                plan.title,
                plan.monitor,
                rate as f64 / 1000.0
            );
        }

        let mut attributes = Window::default_attributes()
            .with_title(plan.title.clone())
            .with_resizable(false);
        if plan.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))));
        } else {
            let origin: PhysicalPosition<i32> = monitor.position();
            attributes = attributes
                .with_inner_size(PhysicalSize::new(plan.size[0], plan.size[1]))
                .with_position(origin);
        }

        let window = Arc::new(event_loop.create_window(attributes)?);
        let physical = window.inner_size();
        let (width, height) = if physical.width == 0 || physical.height == 0 {
            (plan.size[0], plan.size[1])
        } else {
            (physical.width, physical.height)
        };
        debug!("{}: surface {}x{}", plan.title, width, height);

        let surface_texture = SurfaceTexture::new(width, height, window.clone());
        let pixels = Pixels::new(width, height, surface_texture)?;
        window.set_cursor_visible(false);

        Ok(StageWindow {
            window,
            pixels,
            size: [width, height],
            eyes: plan.eyes,
            flipped: 0,
            closed: 0,
        })
    }

    fn push_close_key(&mut self) {
        self.keys.push_back(KeyPress {
            symbol: self.close_key.clone(),
            timestamp_ns: self.timer.now(),
        });
    }
}

impl ApplicationHandler for StageHandler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !self.windows.is_empty() || self.error.is_some() {
            return;
        }
        let plan = self.plan.clone();
        for p in &plan {
            match self.create_window(event_loop, p) {
                Ok(w) => self.windows.push(Some(w)),
                Err(e) => {
                    self.error = Some(e.context(format!("Failed to open window '{}'", p.title)));
                    self.windows.clear();
                    return;
                }
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                if let Some(symbol) = key_name(&event.logical_key) {
                    self.keys.push_back(KeyPress {
                        symbol,
                        timestamp_ns: self.timer.now(),
                    });
                }
            }
            WindowEvent::CloseRequested => {
                info!("window {:?} close requested", id);
                self.push_close_key();
            }
            _ => {}
        }
    }
}

/// The winit event loop plus every open window.
///
/// Single-threaded; eye surfaces and the keyboard share it through
/// [`SharedStage`]. Events are pumped without blocking whenever a surface
/// flips or the keyboard is polled.
pub struct Stage {
    event_loop: EventLoop<()>,
    handler: StageHandler,
    exited: bool,
}

pub type SharedStage = Rc<RefCell<Stage>>;

impl Stage {
    /// Opens every planned window. Window close and loss of the event loop
    /// surface as `close_key` presses.
    pub fn open(
        plan: Vec<WindowPlan>,
        timer: HighPrecisionTimer,
        close_key: &str,
    ) -> Result<SharedStage> {
        let event_loop = EventLoop::new()?;
        let expected = plan.len();
        let mut stage = Stage {
            event_loop,
            handler: StageHandler {
                plan,
                windows: Vec::new(),
                keys: VecDeque::new(),
                timer,
                close_key: close_key.to_string(),
                error: None,
            },
            exited: false,
        };

        let started = Instant::now();
        while stage.handler.windows.len() < expected {
            stage.pump_with(Some(Duration::from_millis(10)));
            if let Some(e) = stage.handler.error.take() {
                return Err(e);
            }
            if stage.exited {
                bail!("Event loop exited before the windows opened");
            }
            if started.elapsed() > OPEN_TIMEOUT {
                bail!("Timed out waiting for {} window(s) to open", expected);
            }
        }
        info!("{} window(s) open", expected);
        Ok(Rc::new(RefCell::new(stage)))
    }

    /// Pixel size of window `index`.
    pub fn surface_size(&self, index: usize) -> Option<[u32; 2]> {
        self.handler
            .windows
            .get(index)
            .and_then(|w| w.as_ref())
            .map(|w| w.size)
    }

    pub fn pump(&mut self) {
        self.pump_with(Some(Duration::ZERO));
    }

    fn pump_with(&mut self, timeout: Option<Duration>) {
        if self.exited {
            return;
        }
        let status = self.event_loop.pump_app_events(timeout, &mut self.handler);
        if let PumpStatus::Exit(code) = status {
            warn!("event loop exited with code {}", code);
            self.exited = true;
            self.handler.push_close_key();
        }
    }

    /// Copies one eye's canvas into its window. The window is shown once every
    /// eye drawing into it has flipped.
    fn present(
        &mut self,
        index: usize,
        canvas: &EyeCanvas,
        viewport: Viewport,
    ) -> Result<(), RenderError> {
        let Some(Some(w)) = self.handler.windows.get_mut(index) else {
            return Err(RenderError::Present(format!("window {index} is not open")));
        };
        let frame_width = w.size[0];
        canvas.blit_into(w.pixels.frame_mut(), frame_width, viewport);
        w.flipped += 1;
        if w.flipped >= w.eyes {
            w.flipped = 0;
            w.pixels
                .render()
                .map_err(|e| RenderError::Present(e.to_string()))?;
            w.window.request_redraw();
        }
        self.pump();
        Ok(())
    }

    fn release(&mut self, index: usize) {
        let Some(slot) = self.handler.windows.get_mut(index) else {
            return;
        };
        let done = match slot.as_mut() {
            Some(w) => {
                w.closed += 1;
                w.closed >= w.eyes
            }
            None => false,
        };
        if done {
            if let Some(w) = slot.take() {
                w.window.set_visible(false);
                debug!("window {} closed", index);
            }
        }
    }

    fn take_keys(&mut self, symbols: &[&str]) -> Vec<KeyPress> {
        self.pump();
        let (matched, rest): (VecDeque<KeyPress>, VecDeque<KeyPress>) = self
            .handler
            .keys
            .drain(..)
            .partition(|k| symbols.contains(&k.symbol.as_str()));
        self.handler.keys = rest;
        matched.into()
    }

    fn clear_keys(&mut self) {
        self.pump();
        self.handler.keys.clear();
    }
}

/// One eye: an off-screen canvas bound to a viewport of a stage window.
pub struct WindowSurface {
    stage: SharedStage,
    window: usize,
    viewport: Viewport,
    canvas: EyeCanvas,
    closed: bool,
}

impl WindowSurface {
    pub fn new(stage: SharedStage, window: usize, viewport: Viewport, canvas: EyeCanvas) -> Self {
        Self {
            stage,
            window,
            viewport,
            canvas,
            closed: false,
        }
    }

    pub fn preload(&mut self, path: &Path) -> Result<(), RenderError> {
        self.canvas.preload(path)
    }
}

impl DisplaySurface for WindowSurface {
    fn draw_image(&mut self, path: &Path) -> Result<(), RenderError> {
        self.canvas.draw_image(path)
    }

    fn draw_text(
        &mut self,
        text: &str,
        position: (f32, f32),
        height: f32,
    ) -> Result<(), RenderError> {
        self.canvas.draw_text(text, position, height)
    }

    fn draw_fixation(&mut self) -> Result<(), RenderError> {
        self.canvas.draw_fixation();
        Ok(())
    }

    fn flip(&mut self) -> Result<(), RenderError> {
        self.stage
            .borrow_mut()
            .present(self.window, &self.canvas, self.viewport)?;
        self.canvas.clear();
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stage.borrow_mut().release(self.window);
        }
    }
}

/// Keyboard fed by the stage's window events.
pub struct WinitKeyboard {
    stage: SharedStage,
}

impl WinitKeyboard {
    pub fn new(stage: SharedStage) -> Self {
        Self { stage }
    }
}

impl KeyboardDevice for WinitKeyboard {
    fn poll(&mut self, symbols: &[&str]) -> Vec<KeyPress> {
        self.stage.borrow_mut().take_keys(symbols)
    }

    fn clear_events(&mut self) {
        self.stage.borrow_mut().clear_keys();
    }
}

/// Symbol for a logical key, as used in response and quit key lists.
pub fn key_name(key: &Key) -> Option<String> {
    match key {
        Key::Named(NamedKey::Escape) => Some("escape".into()),
        Key::Named(NamedKey::Space) => Some("space".into()),
        Key::Named(NamedKey::Enter) => Some("return".into()),
        Key::Named(NamedKey::Tab) => Some("tab".into()),
        Key::Named(NamedKey::Backspace) => Some("backspace".into()),
        Key::Named(NamedKey::ArrowLeft) => Some("left".into()),
        Key::Named(NamedKey::ArrowRight) => Some("right".into()),
        Key::Named(NamedKey::ArrowUp) => Some("up".into()),
        Key::Named(NamedKey::ArrowDown) => Some("down".into()),
        Key::Character(s) if s.as_str() == " " => Some("space".into()),
        Key::Character(s) => Some(s.to_lowercase()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::keyboard::SmolStr;

    #[test]
    fn named_keys() {
        assert_eq!(key_name(&Key::Named(NamedKey::Escape)).as_deref(), Some("escape"));
        assert_eq!(key_name(&Key::Named(NamedKey::Enter)).as_deref(), Some("return"));
        assert_eq!(key_name(&Key::Named(NamedKey::Space)).as_deref(), Some("space"));
        assert_eq!(key_name(&Key::Named(NamedKey::F1)), None);
    }

    #[test]
    fn characters_are_lowercased() {
        assert_eq!(key_name(&Key::Character(SmolStr::new("Q"))).as_deref(), Some("q"));
        assert_eq!(key_name(&Key::Character(SmolStr::new("1"))).as_deref(), Some("1"));
        assert_eq!(key_name(&Key::Character(SmolStr::new(" "))).as_deref(), Some("space"));
    }
}
