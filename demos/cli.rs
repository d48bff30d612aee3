//! Demonstrates the engine's CLI-configurable surface: resolution, target
//! fps, supersampling factor, and a path to a fragment shader file with
//! hot reload enabled.

use clap::Parser;
use lumenforge::core::Core;
use lumenforge::scene::{Scene, SceneConfig};
use lumenforge::shader::ShaderSource;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lumenforge", about = "Run a fragment shader through the engine")]
struct Args {
    /// Path to a WGSL fragment body (the user-shader contract: reads
    /// `stuv`/`fragCoord`/etc. and writes `fragColor`).
    #[arg(long)]
    shader: PathBuf,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    #[arg(long, default_value_t = 1.0)]
    ssaa: f32,

    #[arg(long, default_value_t = 60)]
    frames: u64,
}

fn main() -> anyhow::Result<()> {
    lumenforge::init_logging();
    let args = Args::parse();

    pollster::block_on(async {
        let core = Core::new_headless(args.width, args.height).await?;
        let config = SceneConfig {
            width: args.width,
            height: args.height,
            fps: args.fps,
            ssaa: args.ssaa,
            headless: true,
            ..Default::default()
        };
        let mut scene = Scene::new(core, config, ShaderSource::Path(args.shader.clone()))?;
        scene.initialize()?;

        let reload = lumenforge::hotreload::HotReloadTask::new(vec![args.shader.clone()])?;
        let dt = 1.0 / args.fps;
        for frame in 0..args.frames {
            reload.poll();
            if reload.take_requested() {
                eprintln!("{:?} changed, recompiling", args.shader);
                scene.compile_shaders()?;
            }
            scene.tick(dt)?;
            if frame % args.fps.max(1.0) as u64 == 0 {
                eprintln!("frame {frame} t={:.2}s", scene.time);
            }
        }
        anyhow::Ok(())
    })
}
