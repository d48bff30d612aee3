//! Temporal feedback / motion blur: `temporal=4`, `layers=2`, the fragment
//! shader averages the previous frame (`N1`) against the current layer,
//! matching the feedback-motion-blur acceptance scenario.

use lumenforge::core::Core;
use lumenforge::scene::{Scene, SceneConfig};
use lumenforge::shader::ShaderSource;
use lumenforge::texture::{Sizing, TextureMatrixDesc};

fn main() -> anyhow::Result<()> {
    lumenforge::init_logging();

    pollster::block_on(async {
        let core = Core::new_headless(320, 240).await?;
        let config = SceneConfig { width: 320, height: 240, fps: 60.0, headless: true, ..Default::default() };

        let fragment = ShaderSource::Inline(
            "let history = iChannel_Texture(1, 0, astuv);\n\
             let current = iChannel_Texture(0, 1, astuv);\n\
             fragColor = mix(history, current, 0.25);"
                .into(),
        );
        let mut scene = Scene::new(core, config, fragment)?;

        let desc = TextureMatrixDesc {
            name: "iChannel".into(),
            temporal: 4,
            layers: 2,
            sizing: Sizing::Track { factor: 1.0 },
            ..Default::default()
        };
        scene.shader.matrix = Some(lumenforge::TextureMatrix::new(&scene.core.device, desc, 320, 240)?);

        scene.initialize()?;

        let dt = 1.0 / 60.0;
        for frame in 0..4 {
            scene.tick(dt)?;
            println!("frame {frame} rendered");
        }
        anyhow::Ok(())
    })
}
