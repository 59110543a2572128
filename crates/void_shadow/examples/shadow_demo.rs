//! Shadow Technique Demo
//!
//! Renders a small scene with every shadow technique on the headless
//! render system and prints what each frame submitted.
//!
//! Run with:
//! ```
//! RUST_LOG=debug cargo run -p void_shadow --example shadow_demo [config.json]
//! ```

use std::sync::Arc;

use void_math::{Mat4, Vec3};
use void_shadow::{
    Camera, Capabilities, ColourValue, Entity, FrameContext, HeadlessRenderSystem, IlluminationListener,
    IlluminationStage, Light, Material, Mesh, Pass, SceneGraph, ShadowConfig, ShadowPipelineController,
    ShadowTechnique,
};

struct StageLogger;

impl IlluminationListener for StageLogger {
    fn stage_started(&mut self, stage: IlluminationStage) {
        log::debug!("  stage {:?}", stage);
    }
}

fn build_scene() -> void_shadow::Result<SceneGraph> {
    let mut scene = SceneGraph::new();
    scene.set_ambient_light(ColourValue::new(0.2, 0.2, 0.25, 1.0));
    scene.add_material(Material::with_passes(
        "stone",
        vec![Pass::new("stone/0").with_texture("stone.png")],
    ));
    scene.add_material(Material::with_passes("grass", vec![Pass::new("grass/0")]));

    let mut crate_mesh = Mesh::new_box("crate", Vec3::ONE, "stone");
    crate_mesh.prepare_for_shadow_volume()?;
    let crate_mesh = Arc::new(crate_mesh);

    let mut ground = Mesh::new_box("ground", Vec3::new(30.0, 0.1, 30.0), "grass");
    ground.prepare_for_shadow_volume()?;
    let mut ground = Entity::new("ground", Arc::new(ground))
        .with_transform(Mat4::from_translation(Vec3::new(0.0, -1.1, 0.0)));
    ground.set_cast_shadows(false);
    scene.add_object(ground);

    for (i, x) in [-4.0, 0.0, 4.0].into_iter().enumerate() {
        scene.add_object(
            Entity::new(format!("crate{}", i), Arc::clone(&crate_mesh))
                .with_transform(Mat4::from_translation(Vec3::new(x, 0.0, 0.0))),
        );
    }

    scene.add_light(Light::directional("sun", Vec3::new(-0.4, -1.0, -0.2)));
    scene.add_light(Light::point("lamp", Vec3::new(2.0, 4.0, 3.0), 25.0));
    Ok(scene)
}

fn load_config(path: Option<String>) -> void_shadow::Result<Option<ShadowConfig>> {
    let Some(path) = path else {
        return Ok(None);
    };
    ShadowConfig::load(path).map(Some)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let custom = match load_config(std::env::args().nth(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return;
        }
    };

    let mut scene = match build_scene() {
        Ok(scene) => scene,
        Err(e) => {
            eprintln!("Failed to build scene: {}", e);
            return;
        }
    };

    let mut camera = Camera::perspective("main", 60.0_f32.to_radians(), 16.0 / 9.0, 0.5, 0.0);
    camera.position = Vec3::new(0.0, 6.0, 18.0);
    camera.look_at(Vec3::ZERO);

    let configs = match custom {
        Some(config) => vec![config],
        None => vec![
            ShadowConfig::disabled(),
            ShadowConfig::stencil_additive(),
            ShadowConfig::stencil_modulative(),
            ShadowConfig {
                technique: ShadowTechnique::TextureAdditive,
                ..ShadowConfig::texture_modulative()
            },
            ShadowConfig::texture_modulative(),
        ],
    };

    println!("Shadow Technique Demo");
    println!("=====================\n");

    for config in configs {
        let technique = config.technique;
        let mut controller = ShadowPipelineController::new(config, vec![Box::new(StageLogger)]);
        let mut rs = HeadlessRenderSystem::new(Capabilities::ALL);
        let mut frame = FrameContext::new(1920, 1080);

        for _ in 0..3 {
            controller.render_frame(&mut scene, &camera, &mut rs, &mut frame);
            frame.advance();
        }

        let stats = controller.last_stats();
        println!("{:?}:", technique);
        println!("  Shadow lights: {} ({} zfail)", stats.shadow_lights, stats.zfail_lights);
        println!("  Casters: {}", stats.casters);
        println!("  Volume draws: {}", stats.volume_draws);
        println!("  Shadow textures: {}", stats.shadow_textures);
        println!("  Object draws: {}", stats.object_draws);
        println!("  Skipped: {}", stats.skipped);
        println!("  Device draws over {} frames: {}", rs.frames_rendered(), rs.draws().len());
        println!();
    }
}
