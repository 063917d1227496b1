mod config;

use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use forge_common::Rect;
use forge_ecs::{Collision, Name, Node, Physics, World};
use forge_physics::PhysicsSystem;
use forge_render::{
    BufferId, ClearFlags, ElementType, ElementUsage, IndexBuffer, IndexType, MatrixType,
    OffscreenTarget, PrimitiveMode, RecordingContext, Renderer, Shader, ShaderId, ShaderUniform,
    Storage, VertexBuffer, VertexDeclaration,
};
use glam::{Mat4, Vec3};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;

#[derive(Parser)]
#[command(name = "forge-cli", about = "Drive the render state cache and the physics system")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate info and the effective configuration
    Info,
    /// Simulate falling bodies next to a moving static platform
    Physics {
        /// Number of ticks to simulate
        #[arg(short, long, default_value = "60")]
        ticks: u32,
        /// Seconds per tick
        #[arg(short, long, default_value = "0.016")]
        dt: f32,
        /// Number of dynamic bodies
        #[arg(short, long, default_value = "3")]
        bodies: usize,
    },
    /// Issue draws against a recording context and report cache statistics
    Render {
        /// Number of draws
        #[arg(short, long, default_value = "100")]
        draws: u32,
        /// Number of distinct meshes cycled through
        #[arg(short, long, default_value = "4")]
        meshes: u32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => {
            println!("forge-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("render: {}", forge_render::crate_info());
            println!("ecs: {}", forge_ecs::crate_info());
            println!("physics: {}", forge_physics::crate_info());
            println!("config: {}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Physics { ticks, dt, bodies } => run_physics(&config, ticks, dt, bodies)?,
        Commands::Render { draws, meshes } => run_render(&config, draws, meshes)?,
    }

    Ok(())
}

fn run_physics(config: &EngineConfig, ticks: u32, dt: f32, bodies: usize) -> anyhow::Result<()> {
    println!("Physics demo: {bodies} bodies, {ticks} ticks of {dt}s");

    let mut world = World::new();
    let physics: PhysicsSystem = PhysicsSystem::new(config.physics);
    world.add_system(physics)?;

    let platform = world.create_entity();
    world.add_component(platform, Name("platform".into()))?;
    world.add_component(platform, Node::default())?;
    world.add_component(platform, Collision::default())?;

    let mut falling = Vec::with_capacity(bodies);
    for i in 0..bodies {
        let entity = world.create_entity();
        world.add_component(entity, Name(format!("box_{i}")))?;
        world.add_component(entity, Node::at(Vec3::new(i as f32 * 2.0, 10.0, 0.0)))?;
        world.add_component(entity, Collision::default())?;
        world.add_component(entity, Physics::default())?;
        falling.push(entity);
    }

    for tick in 0..ticks {
        if let Some(node) = world.component_mut::<Node>(platform) {
            node.transform.position.x = (tick as f32 * dt).sin();
        }
        world.update(dt)?;
    }

    let system = world
        .system::<PhysicsSystem>()
        .ok_or_else(|| anyhow::anyhow!("physics system missing"))?;
    if let Some(body) = system.body(platform) {
        use forge_physics::RigidBody;
        println!(
            "platform: position={:?} velocity={:?}",
            body.position(),
            body.velocity()
        );
    }
    for entity in falling {
        let name = world.component::<Name>(entity).map(|n| n.0.as_str()).unwrap_or("?");
        if let Some(node) = world.component::<Node>(entity) {
            println!("{name}: position={:?}", node.transform.position);
        }
    }
    println!("events: {}", world.events().len());
    Ok(())
}

fn run_render(config: &EngineConfig, draws: u32, meshes: u32) -> anyhow::Result<()> {
    println!("Render demo: {draws} draws over {meshes} meshes");

    let context = RecordingContext::new(1).with_uniforms(
        ShaderId(1),
        &[
            (ShaderUniform::WorldViewProjMatrix, 0),
            (ShaderUniform::WorldMatrix, 1),
        ],
    );
    let log = context.log();
    let mut renderer = Renderer::initialize(Box::new(context), config.renderer.clone())?;

    renderer.set_target(Some(OffscreenTarget::new(1280, 720)))?;
    renderer.set_viewport(Rect::new(0, 0, 1280, 720))?;
    renderer.clear(ClearFlags::ALL)?;

    renderer.set_shader(Some(Shader::new(ShaderId(1))))?;
    renderer.set_matrix(
        MatrixType::Projection,
        Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, 100.0),
    );
    renderer.set_matrix(
        MatrixType::View,
        Mat4::look_at_rh(Vec3::new(0.0, 5.0, 10.0), Vec3::ZERO, Vec3::Y),
    );

    let declaration = Rc::new(VertexDeclaration::packed(&[
        (ElementUsage::Position, ElementType::Float3),
        (ElementUsage::Normal, ElementType::Float3),
        (ElementUsage::TexCoord, ElementType::Float2),
    ]));
    let mesh_buffers: Vec<_> = (0..meshes.max(1))
        .map(|i| {
            (
                VertexBuffer::new(Storage::Device(BufferId(1000 + i)), declaration.clone(), 24),
                IndexBuffer::indexed(Storage::Device(BufferId(2000 + i)), IndexType::U16, 36),
            )
        })
        .collect();

    for i in 0..draws {
        let (vertices, indices) = &mesh_buffers[i as usize % mesh_buffers.len()];
        renderer.set_vertex_buffer(vertices.clone())?;
        renderer.set_index_buffer(Some(indices.clone()))?;
        renderer.set_matrix(
            MatrixType::World,
            Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)),
        );
        renderer.draw_indexed_primitives(PrimitiveMode::TriangleList, 0, 36)?;
    }
    renderer.flush()?;

    println!("stats: {}", renderer.stats());
    println!("vertex arrays cached: {}", renderer.vao_cache_len());
    println!("device commands: {}", log.len());

    renderer.uninitialize();
    Ok(())
}
