//! A single GPU queue's pending command list.
//!
//! Client code calls the methods below to append typed command records;
//! nothing is submitted until `Context::execute_all` runs. A queue enforces
//! only the invariants that are cheap to check at record time (pass
//! nesting, at-most-one-present); everything resource-state-related is the
//! planner's job during `execute_all`.

use crate::command::{Bindings, Command, CommandInner, DrawIndexedParams, DrawParams, ThreadGroupCount};
use crate::ids::{Counter, GlobalSubmissionIndex, UniqueResourceId};

pub struct PassToken {
    _private: (),
}

pub struct Queue {
    pub index: u32,
    pub(crate) pending: Vec<Command>,
    submission_counter: Counter<crate::ids::QueueSubmissionIndex>,
    timer_counter: u32,
    within_pass: bool,
    presented_swap_chains_this_batch: Vec<UniqueResourceId>,
}

impl Queue {
    pub fn new(index: u32) -> Queue {
        Queue {
            index,
            pending: Vec::new(),
            submission_counter: Counter::default(),
            timer_counter: 0,
            within_pass: false,
            presented_swap_chains_this_batch: Vec::new(),
        }
    }

    fn push(
        &mut self,
        global_counter: &mut Counter<GlobalSubmissionIndex>,
        inner: CommandInner,
        debug_description: Option<String>,
    ) {
        self.pending.push(Command {
            global_submission_index: global_counter.next(),
            inner,
            debug_description,
        });
    }

    pub fn copy_buffer(
        &mut self,
        global_counter: &mut Counter<GlobalSubmissionIndex>,
        src: UniqueResourceId,
        dst: UniqueResourceId,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        self.push(
            global_counter,
            CommandInner::CopyBuffer {
                src,
                dst,
                src_offset,
                dst_offset,
                size,
            },
            None,
        );
    }

    pub fn copy_buffer_to_image(
        &mut self,
        global_counter: &mut Counter<GlobalSubmissionIndex>,
        src: UniqueResourceId,
        dst: UniqueResourceId,
        mip: u32,
        array_slice: u32,
    ) {
        self.push(
            global_counter,
            CommandInner::CopyBufferToImage {
                src,
                dst,
                mip,
                array_slice,
            },
            None,
        );
    }

    pub fn build_blas(&mut self, global_counter: &mut Counter<GlobalSubmissionIndex>, blas: UniqueResourceId) {
        self.push(global_counter, CommandInner::BuildBlas { blas }, None);
    }

    pub fn build_tlas(
        &mut self,
        global_counter: &mut Counter<GlobalSubmissionIndex>,
        tlas: UniqueResourceId,
        instances: UniqueResourceId,
    ) {
        self.push(
            global_counter,
            CommandInner::BuildTlas { tlas, instances },
            None,
        );
    }

    pub fn run_compute_shader(
        &mut self,
        global_counter: &mut Counter<GlobalSubmissionIndex>,
        pipeline: u32,
        group_count: ThreadGroupCount,
        bindings: Bindings,
    ) {
        self.push(
            global_counter,
            CommandInner::RunComputeShader {
                pipeline,
                group_count,
                bindings,
            },
            None,
        );
    }

    pub fn run_compute_shader_with_thread_dimensions(
        &mut self,
        global_counter: &mut Counter<GlobalSubmissionIndex>,
        pipeline: u32,
        threads_x: u32,
        threads_y: u32,
        threads_z: u32,
        group_size: (u32, u32, u32),
        bindings: Bindings,
    ) {
        let group_count = ThreadGroupCount {
            x: div_round_up(threads_x, group_size.0),
            y: div_round_up(threads_y, group_size.1),
            z: div_round_up(threads_z, group_size.2),
        };
        self.run_compute_shader(global_counter, pipeline, group_count, bindings);
    }

    /// Begins a pass; returns a token whose `end` must be called before the
    /// queue is used for anything else. Nesting a pass within a pass is a
    /// usage error.
    pub fn begin_pass(
        &mut self,
        global_counter: &mut Counter<GlobalSubmissionIndex>,
        color_targets: impl Into<smallvec::SmallVec<[UniqueResourceId; 8]>>,
        depth_target: Option<UniqueResourceId>,
    ) -> PassToken {
        if self.within_pass {
            log::error!("queue {}: begin_pass called while already within a pass", self.index);
            panic!("begin_pass: already within a pass");
        }
        self.within_pass = true;
        self.push(
            global_counter,
            CommandInner::BeginPass {
                color_targets: color_targets.into(),
                depth_target,
            },
            None,
        );
        PassToken { _private: () }
    }

    pub fn draw_instanced(
        &mut self,
        global_counter: &mut Counter<GlobalSubmissionIndex>,
        _pass: &PassToken,
        pipeline: u32,
        params: DrawParams,
        bindings: Bindings,
    ) {
        self.require_within_pass("draw_instanced");
        self.push(
            global_counter,
            CommandInner::DrawInstanced { pipeline, params, bindings },
            None,
        );
    }

    pub fn draw_indexed_instanced(
        &mut self,
        global_counter: &mut Counter<GlobalSubmissionIndex>,
        _pass: &PassToken,
        pipeline: u32,
        params: DrawIndexedParams,
        bindings: Bindings,
    ) {
        self.require_within_pass("draw_indexed_instanced");
        self.push(
            global_counter,
            CommandInner::DrawIndexedInstanced { pipeline, params, bindings },
            None,
        );
    }

    pub fn end_pass(&mut self, global_counter: &mut Counter<GlobalSubmissionIndex>, _pass: PassToken) {
        self.require_within_pass("end_pass");
        self.within_pass = false;
        self.push(global_counter, CommandInner::EndPass, None);
    }

    pub fn trace_rays(
        &mut self,
        global_counter: &mut Counter<GlobalSubmissionIndex>,
        pipeline: u32,
        width: u32,
        height: u32,
        depth: u32,
        bindings: Bindings,
    ) {
        self.push(
            global_counter,
            CommandInner::TraceRays {
                pipeline,
                width,
                height,
                depth,
                bindings,
            },
            None,
        );
    }

    pub fn release_dependency(
        &mut self,
        global_counter: &mut Counter<GlobalSubmissionIndex>,
        dependency: UniqueResourceId,
    ) {
        self.push(
            global_counter,
            CommandInner::ReleaseDependency { dependency },
            None,
        );
    }

    pub fn acquire_dependency(
        &mut self,
        global_counter: &mut Counter<GlobalSubmissionIndex>,
        dependency: UniqueResourceId,
    ) {
        self.push(
            global_counter,
            CommandInner::AcquireDependency { dependency },
            None,
        );
    }

    /// At most one present per batch per swap-chain; a repeat call within
    /// the same batch is a usage error.
    pub fn present(
        &mut self,
        global_counter: &mut Counter<GlobalSubmissionIndex>,
        swap_chain: UniqueResourceId,
    ) {
        if self.presented_swap_chains_this_batch.contains(&swap_chain) {
            log::error!(
                "queue {}: swap-chain {:?} already presented this batch",
                self.index,
                swap_chain
            );
            panic!("present: swap-chain already presented this batch");
        }
        self.presented_swap_chains_this_batch.push(swap_chain);
        self.push(global_counter, CommandInner::Present { swap_chain }, None);
    }

    pub fn start_timer(&mut self, global_counter: &mut Counter<GlobalSubmissionIndex>, name: impl Into<String>) {
        self.timer_counter += 1;
        self.push(global_counter, CommandInner::StartTimer { name: name.into() }, None);
    }

    pub fn end_timer(&mut self, global_counter: &mut Counter<GlobalSubmissionIndex>, name: impl Into<String>) {
        self.push(global_counter, CommandInner::EndTimer { name: name.into() }, None);
    }

    pub fn pause_for_debugging(&mut self, global_counter: &mut Counter<GlobalSubmissionIndex>) {
        self.push(global_counter, CommandInner::PauseForDebugging, None);
    }

    fn require_within_pass(&self, op: &str) {
        if !self.within_pass {
            log::error!("queue {}: {} called outside a pass", self.index, op);
            panic!("{}: not within a pass", op);
        }
    }

    /// Drains this queue's pending commands, resetting per-batch state;
    /// called by `Context::execute_all` once both planner passes for this
    /// batch are done.
    pub(crate) fn take_pending(&mut self) -> Vec<Command> {
        self.presented_swap_chains_this_batch.clear();
        std::mem::take(&mut self.pending)
    }

    pub fn timer_count(&self) -> u32 {
        self.timer_counter
    }

    pub fn submission_counter(&mut self) -> &mut Counter<crate::ids::QueueSubmissionIndex> {
        &mut self.submission_counter
    }
}

fn div_round_up(v: u32, d: u32) -> u32 {
    (v + d - 1) / d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "not within a pass")]
    fn draw_outside_pass_panics() {
        let mut global = Counter::default();
        let mut queue = Queue::new(0);
        let pass = PassToken { _private: () };
        queue.draw_instanced(
            &mut global,
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
    }

    #[test]
    #[should_panic(expected = "already presented this batch")]
    fn double_present_in_one_batch_panics() {
        let mut global = Counter::default();
        let mut queue = Queue::new(0);
        let sc = UniqueResourceId::default_for_test();
        queue.present(&mut global, sc);
        queue.present(&mut global, sc);
    }

    #[test]
    fn begin_end_pass_round_trips() {
        let mut global = Counter::default();
        let mut queue = Queue::new(0);
        let pass = queue.begin_pass(&mut global, vec![], None);
        queue.end_pass(&mut global, pass);
        assert_eq!(queue.pending.len(), 2);
    }
}
