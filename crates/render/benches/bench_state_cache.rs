use std::hint::black_box;
use std::rc::Rc;
use std::time::Instant;

use forge_render::{
    BufferId, ElementType, ElementUsage, MatrixType, PrimitiveMode, RecordingContext, Renderer,
    RendererConfig, Shader, ShaderId, ShaderUniform, Storage, VertexBuffer, VertexDeclaration,
};
use glam::{Mat4, Vec3};

fn make_renderer() -> (Renderer, forge_render::CommandLog) {
    let ctx = RecordingContext::new(1)
        .with_uniforms(
            ShaderId(1),
            &[
                (ShaderUniform::WorldViewProjMatrix, 0),
                (ShaderUniform::WorldMatrix, 1),
            ],
        )
        .with_uniforms(ShaderId(2), &[(ShaderUniform::WorldViewProjMatrix, 0)]);
    let log = ctx.log();
    let renderer = match Renderer::initialize(Box::new(ctx), RendererConfig::default()) {
        Ok(renderer) => renderer,
        Err(err) => panic!("renderer initialization failed: {err}"),
    };
    (renderer, log)
}

fn make_meshes(count: u32) -> Vec<Rc<VertexBuffer>> {
    let declaration = Rc::new(VertexDeclaration::packed(&[
        (ElementUsage::Position, ElementType::Float3),
        (ElementUsage::Normal, ElementType::Float3),
        (ElementUsage::TexCoord, ElementType::Float2),
    ]));
    (0..count)
        .map(|i| VertexBuffer::new(Storage::Device(BufferId(100 + i)), declaration.clone(), 36))
        .collect()
}

/// Same bindings every frame: only the world matrix changes.
fn bench_steady_draws(iterations: usize) {
    let (mut renderer, log) = make_renderer();
    let meshes = make_meshes(1);
    let _ = renderer.set_shader(Some(Shader::new(ShaderId(1))));
    let _ = renderer.set_vertex_buffer(meshes[0].clone());

    let start = Instant::now();
    for i in 0..iterations {
        let world = Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0));
        renderer.set_matrix(MatrixType::World, black_box(world));
        let _ = black_box(renderer.draw_primitives(PrimitiveMode::TriangleList, 0, 36));
        log.clear();
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  steady draws ({iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

/// Cycle through meshes so every draw is a vertex-array cache lookup.
fn bench_mesh_switching(mesh_count: u32, iterations: usize) {
    let (mut renderer, log) = make_renderer();
    let meshes = make_meshes(mesh_count);
    let _ = renderer.set_shader(Some(Shader::new(ShaderId(1))));

    let start = Instant::now();
    for i in 0..iterations {
        let mesh = &meshes[i % meshes.len()];
        let _ = renderer.set_vertex_buffer(mesh.clone());
        let _ = black_box(renderer.draw_primitives(PrimitiveMode::TriangleList, 0, 36));
        log.clear();
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    let stats = renderer.stats();
    println!(
        "  mesh switching ({mesh_count} meshes, {iterations} iters): {per_iter:?}/iter, total {elapsed:?} [{stats}]"
    );
}

/// Alternate shaders so every draw rebinds uniform locations.
fn bench_shader_switching(iterations: usize) {
    let (mut renderer, log) = make_renderer();
    let meshes = make_meshes(1);
    let shaders = [Shader::new(ShaderId(1)), Shader::new(ShaderId(2))];
    let _ = renderer.set_vertex_buffer(meshes[0].clone());

    let start = Instant::now();
    for i in 0..iterations {
        let _ = renderer.set_shader(Some(shaders[i % 2].clone()));
        let _ = black_box(renderer.draw_primitives(PrimitiveMode::TriangleList, 0, 36));
        log.clear();
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  shader switching ({iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn main() {
    println!("=== State Cache Benchmarks ===\n");

    println!("Steady draws:");
    bench_steady_draws(10000);
    bench_steady_draws(100000);

    println!("\nMesh switching (vertex-array cache):");
    bench_mesh_switching(4, 10000);
    bench_mesh_switching(64, 10000);
    bench_mesh_switching(1024, 10000);

    println!("\nShader switching (matrix resend):");
    bench_shader_switching(10000);
    bench_shader_switching(100000);

    println!("\n=== Done ===");
}
