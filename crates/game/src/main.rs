//! Skyward: fly a craft over procedural terrain under a shadow-casting spotlight.

mod assets;
mod config;
mod events;
mod headless;
mod state;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowId},
};

use config::GameConfig;
use state::GameState;

/// Application handler for winit.
struct App {
    config: GameConfig,
    state: Option<GameState>,
}

impl App {
    fn new(config: GameConfig) -> Self {
        Self { config, state: None }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_none() {
            let config = &self.config;
            let mut window_attrs = Window::default_attributes()
                .with_title("Skyward")
                .with_inner_size(winit::dpi::LogicalSize::new(config.window_width, config.window_height));
            if config.fullscreen {
                window_attrs = window_attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
            }

            let window = match event_loop.create_window(window_attrs) {
                Ok(w) => Arc::new(w),
                Err(e) => {
                    log::error!("Failed to create window: {}", e);
                    event_loop.exit();
                    return;
                }
            };

            match pollster::block_on(GameState::new(window.clone(), config)) {
                Ok(s) => {
                    self.state = Some(s);
                    window.request_redraw();
                }
                Err(e) => {
                    log::error!("Failed to initialize renderer: {:#}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(state) = &mut self.state {
            if state.handle_window_event(event) || !state.running {
                event_loop.exit();
            }
        }
    }

    fn device_event(&mut self, _: &ActiveEventLoop, _: DeviceId, event: DeviceEvent) {
        if let Some(state) = &mut self.state {
            state.handle_device_event(event);
        }
    }
}

/// Frame count from `--headless N` or `--headless=N`, if given.
fn headless_frames(args: impl IntoIterator<Item = String>) -> Result<Option<u32>> {
    let mut args = args.into_iter();
    let mut frames = None;
    while let Some(arg) = args.next() {
        let value = if arg == "--headless" {
            args.next().ok_or_else(|| anyhow!("--headless needs a frame count"))?
        } else if let Some(value) = arg.strip_prefix("--headless=") {
            value.to_string()
        } else {
            log::warn!("Ignoring unknown argument '{}'", arg);
            continue;
        };
        frames = Some(
            value
                .parse::<u32>()
                .map_err(|e| anyhow!("invalid frame count '{}': {}", value, e))?,
        );
    }
    Ok(frames)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GameConfig::load();
    if !config::config_path().exists() {
        config.save();
    }

    if let Some(frames) = headless_frames(std::env::args().skip(1))? {
        let report = headless::run(frames, &config)?;
        println!("{}", report);
        return Ok(());
    }

    println!("Skyward");
    println!("  WASD        move camera / craft      Mouse      look");
    println!("  Arrows      turn craft               Shift      boost");
    println!("  C           free / chase camera      F2         shadows");
    println!("  F3          shadow map inset         F5         reload shaders");
    println!("  Escape      quit");

    log::info!("Starting Skyward");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn headless_flag_forms() {
        assert_eq!(headless_frames(args(&[])).unwrap(), None);
        assert_eq!(headless_frames(args(&["--headless", "12"])).unwrap(), Some(12));
        assert_eq!(headless_frames(args(&["--headless=3"])).unwrap(), Some(3));
        assert!(headless_frames(args(&["--headless"])).is_err());
        assert!(headless_frames(args(&["--headless", "many"])).is_err());
    }
}
