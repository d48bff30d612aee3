//! The minimal end-to-end path: a 320×240 headless scene running a plain
//! UV gradient shader at 60 fps for one second, matching the basic-scene
//! acceptance scenario (user shader `fragColor = vec4(stuv.x, stuv.y, 0, 1)`
//! should put red/green at roughly 0.5 at the frame center).

use lumenforge::core::Core;
use lumenforge::scene::{Scene, SceneConfig};
use lumenforge::shader::ShaderSource;

fn main() -> anyhow::Result<()> {
    lumenforge::init_logging();

    pollster::block_on(async {
        let core = Core::new_headless(320, 240).await?;
        let config = SceneConfig { width: 320, height: 240, fps: 60.0, headless: true, ..Default::default() };
        let fragment = ShaderSource::Inline("fragColor = vec4<f32>(stuv.x, stuv.y, 0.0, 1.0);".into());
        let mut scene = Scene::new(core, config, fragment)?;
        scene.initialize()?;

        let dt = 1.0 / 60.0;
        for frame in 0..60 {
            scene.tick(dt)?;
            if frame == 59 {
                println!("rendered frame {} at t={:.3}s", scene.frame, scene.time);
            }
        }
        anyhow::Ok(())
    })
}
