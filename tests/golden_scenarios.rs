//! End-to-end scenarios against the public `Context` API plus the mock
//! backend: a single-pass triangle, a cross-queue dependency, a bindless
//! overwrite, a swap-chain resize, and a BLAS build.

use rendergraph::command::{DrawParams, ThreadGroupCount};
use rendergraph::config::ContextConfig;
use rendergraph::context::Context;
use rendergraph::mock::MockBackend;
use rendergraph::resources::{BufferUsageFlags, Format, ImageUsageFlags, Tiling};

fn context(queue_count: usize) -> Context {
    Context::create_with_config(Box::new(MockBackend::new(queue_count)), ContextConfig::default()).unwrap()
}

#[test]
fn single_pass_triangle_records_and_executes() {
    let mut ctx = context(1);
    let image = ctx.request_image2d(
        128,
        128,
        1,
        1,
        Format::Rgba8Unorm,
        Tiling::Optimal,
        ImageUsageFlags::COLOR_RENDER_TARGET | ImageUsageFlags::SHADER_RESOURCE,
    );
    let swap_chain = ctx.request_swap_chain(800, 600, Format::Rgba8Unorm, 2, 0);

    {
        let mut q = ctx.queue(0);
        let pass = q.begin_pass(vec![image.id], None);
        q.draw_instanced(
            &pass,
            0,
            DrawParams {
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            },
            vec![],
        );
        q.end_pass(pass);
        q.present(swap_chain.id);
    }

    let stats = ctx.execute_all().unwrap();
    assert_eq!(stats.commands_per_queue[0], 4);
    // one transition for the color target entering `BeginPass`, one for the
    // swap-chain image entering `Present`
    assert_eq!(stats.image_barriers, 2);
    assert_eq!(stats.buffer_barriers, 0);
}

#[test]
fn cross_queue_dependency_tracks_release_and_acquire() {
    let mut ctx = context(2);
    let buffer = ctx.request_buffer(4096, BufferUsageFlags::SHADER_RESOURCE | BufferUsageFlags::COPY_SRC);
    let other = ctx.request_buffer(4096, BufferUsageFlags::COPY_DST);
    let dependency = ctx.request_dependency();
    assert!(!dependency.is_released());

    {
        let mut q0 = ctx.queue(0);
        q0.run_compute_shader(0, ThreadGroupCount { x: 1, y: 1, z: 1 }, vec![]);
        q0.release_dependency(dependency.id);
    }
    {
        let mut q1 = ctx.queue(1);
        q1.acquire_dependency(dependency.id);
        q1.copy_buffer(buffer.id, other.id, 0, 0, 4096);
    }

    let stats = ctx.execute_all().unwrap();
    assert_eq!(stats.commands_per_queue, vec![2, 2]);
    assert!(dependency.is_released());
}

#[test]
fn bindless_overwrite_sets_the_overwrite_flag_and_relinks() {
    let mut ctx = context(1);
    let array = ctx.request_image_descriptor_array(Some(4));
    let img1 = ctx.request_image2d(64, 64, 1, 1, Format::Rgba8Unorm, Tiling::Optimal, ImageUsageFlags::SHADER_RESOURCE);
    let img2 = ctx.request_image2d(64, 64, 1, 1, Format::Rgba8Unorm, Tiling::Optimal, ImageUsageFlags::SHADER_RESOURCE);

    ctx.write_image_descriptors(&array, &[(2, img1.id)]);
    assert!(!array.has_descriptor_overwrites());
    ctx.write_image_descriptors(&array, &[(2, img2.id)]);

    assert!(array.has_descriptor_overwrites());
    assert!(array.slots_for(img1.id).is_empty());
    assert_eq!(array.slots_for(img2.id), vec![2]);
}

#[test]
fn swap_chain_resize_is_observed_before_the_next_acquire() {
    let mut ctx = context(1);
    let swap_chain = ctx.request_swap_chain(800, 600, Format::Rgba8Unorm, 2, 0);

    ctx.queue(0).present(swap_chain.id);
    ctx.execute_all().unwrap();
    assert_eq!(*swap_chain.current_size.lock().unwrap(), (800, 600));

    swap_chain.resize(1024, 768);
    ctx.queue(0).present(swap_chain.id);
    ctx.execute_all().unwrap();
    assert_eq!(*swap_chain.current_size.lock().unwrap(), (1024, 768));
}

#[test]
fn blas_and_tlas_are_built_by_execute_all() {
    let mut ctx = context(1);
    let blas = ctx.request_blas();
    let tlas = ctx.request_tlas();
    let instances = ctx.request_buffer(4096, BufferUsageFlags::SHADER_RESOURCE);
    assert!(!blas.is_built());
    assert!(!tlas.is_built());

    {
        let mut q = ctx.queue(0);
        q.build_blas(blas.id);
        q.build_tlas(tlas.id, instances.id);
    }
    let stats = ctx.execute_all().unwrap();
    assert_eq!(stats.commands_per_queue[0], 2);
    assert!(blas.is_built());
    assert!(tlas.is_built());
}

#[test]
fn execute_all_advances_the_batch_index_exactly_once() {
    let mut ctx = context(1);
    let first = ctx.execute_all().unwrap().batch.unwrap();
    let second = ctx.execute_all().unwrap().batch.unwrap();
    assert_eq!(second.value(), first.value() + 1);
}
