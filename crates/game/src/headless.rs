//! `--headless N`: run the scene on the GPU-less backend and report.

use anyhow::Result;
use engine_core::{MoveDirection, Vec3};
use renderer::{FrameStats, HeadlessDevice, Renderer};

use crate::assets::SceneLoader;
use crate::config::GameConfig;

/// Fixed step used for headless frames.
const HEADLESS_DT: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Default)]
pub struct HeadlessReport {
    pub frames: u32,
    pub shadow_draws: u64,
    pub geometry_draws: u64,
    pub post_draws: u64,
    pub culled_nodes: u64,
    pub gpu_errors: u64,
    pub craft_position: Vec3,
    pub live_textures: usize,
    pub live_framebuffers: usize,
}

impl HeadlessReport {
    fn add(&mut self, stats: &FrameStats) {
        self.frames += 1;
        self.shadow_draws += stats.shadow_draws as u64;
        self.geometry_draws += stats.geometry_draws as u64;
        self.post_draws += stats.post_draws as u64;
        self.culled_nodes += stats.culled_nodes as u64;
        self.gpu_errors += stats.gpu_errors as u64;
    }
}

impl std::fmt::Display for HeadlessReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "frames:          {}", self.frames)?;
        writeln!(f, "shadow draws:    {}", self.shadow_draws)?;
        writeln!(f, "geometry draws:  {}", self.geometry_draws)?;
        writeln!(f, "post draws:      {}", self.post_draws)?;
        writeln!(f, "culled nodes:    {}", self.culled_nodes)?;
        writeln!(f, "gpu errors:      {}", self.gpu_errors)?;
        writeln!(f, "live textures:   {}", self.live_textures)?;
        writeln!(f, "live framebuffers: {}", self.live_framebuffers)?;
        write!(
            f,
            "craft position:  ({:.2}, {:.2}, {:.2})",
            self.craft_position.x, self.craft_position.y, self.craft_position.z
        )
    }
}

/// Fly the craft forward for `frames` fixed steps, rendering each one.
pub fn run(frames: u32, config: &GameConfig) -> Result<HeadlessReport> {
    let (width, height) = (config.window_width.max(1), config.window_height.max(1));
    let mut renderer = Renderer::new(
        HeadlessDevice::new(width, height),
        config.renderer_settings(),
        Box::new(SceneLoader::new(std::env::current_dir().ok())),
    );
    renderer.init(width, height)?;
    renderer.craft_move(MoveDirection::Forward, true);

    let mut report = HeadlessReport::default();
    for _ in 0..frames {
        renderer.update(HEADLESS_DT);
        let stats = renderer.render()?;
        report.add(&stats);
    }

    let stats = renderer.device().stats();
    report.live_textures = stats.live_textures();
    report.live_framebuffers = stats.live_framebuffers();
    report.craft_position = renderer.craft().position();
    log::info!("Headless run finished after {} frames", report.frames);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssetConfig, RoleConfig, SourceConfig};

    #[test]
    fn headless_run_flies_and_renders() {
        let mut config = GameConfig {
            window_width: 160,
            window_height: 90,
            ..Default::default()
        };
        config.scene.light.cast_shadows = true;
        config.scene.assets = vec![
            AssetConfig {
                role: RoleConfig::Terrain,
                source: SourceConfig::Terrain {
                    size: 32.0,
                    resolution: 4,
                    height_scale: 2.0,
                    seed: 9,
                },
                collidable: false,
                occlusion_tested: true,
                required: true,
                translation: [0.0, -750.0, 0.0],
                scale: 50.0,
                spin: None,
            },
            AssetConfig {
                role: RoleConfig::Craft,
                source: SourceConfig::Craft { length: 100.0 },
                collidable: false,
                occlusion_tested: true,
                required: true,
                translation: [0.0; 3],
                scale: 1.0,
                spin: None,
            },
        ];

        let report = run(10, &config).unwrap();
        assert_eq!(report.frames, 10);
        assert_eq!(report.gpu_errors, 0);
        assert_eq!(report.post_draws, 10);
        assert_eq!(report.shadow_draws, 20);
        // Offscreen color + depth, shadow depth, terrain textures.
        assert!(report.live_textures >= 3);
        assert_eq!(report.live_framebuffers, 2);
        let expected = Vec3::new(10.0, 20.0, 5.0 * HEADLESS_DT * 10.0);
        assert!(report.craft_position.abs_diff_eq(expected, 1e-3));
    }
}
