use log::{debug, trace, warn};

use super::{
    context::Context,
    memory::MemoryAllocator,
    process::{Pcb, Scheduler},
};

/// terminate every process - `exit()`
pub const EXIT: i32 = 0x0;
/// give up the CPU to the next ready process - `idle()`
pub const IDLE: i32 = 0x1;

/// result written into the caller's context for an unknown request
pub const EUNKNOWN: i32 = -1;

fn syscall_name(n: i32) -> &'static str {
    match n {
        EXIT => "exit",
        IDLE => "idle",
        _ => "<unknown>",
    }
}

/// Handle a system call and return the context to resume.
///
/// IDLE re-queues the caller, into the blocked queue if it blocked itself while running.
/// EXIT tears down every process. Afterwards the head of the
/// ready queue is resumed, or the remembered idle context if nothing can run. Unknown
/// requests come straight back to the caller with `EUNKNOWN` in the accumulator.
pub fn dispatch<A: MemoryAllocator>(scheduler: &mut Scheduler<A>, mut ctx: Context) -> Context {
    let n = ctx.request();
    trace!("syscall: {}", syscall_name(n));

    match n {
        IDLE => idle(scheduler, &ctx),
        EXIT => exit(scheduler),
        _ => {
            warn!("unknown syscall {}, returning to caller", n);
            ctx.set_result(EUNKNOWN);
            return ctx;
        }
    }

    // readiness looks at the whole queue, selection only ever looks at the head
    if scheduler.has_runnable() {
        if let Some(next) = scheduler.take_runnable_head() {
            scheduler.current = Some(next);
            if let Some(pcb) = scheduler.get(next) {
                debug!("dispatching {}", pcb.name());
                return pcb.context();
            }
        }
        warn!("ready queue head is suspended, idling");
    }

    match scheduler.idle_context.take() {
        Some(idle) => idle,
        None => {
            warn!("no idle context recorded, returning to caller");
            ctx
        }
    }
}

fn idle<A: MemoryAllocator>(scheduler: &mut Scheduler<A>, ctx: &Context) {
    if scheduler.idle_context.is_none() {
        scheduler.idle_context = Some(*ctx);
    }
    if let Some(current) = scheduler.current.take() {
        let requeued = scheduler
            .save_context(current, ctx)
            .and_then(|()| scheduler.insert(current));
        if let Err(err) = requeued {
            warn!("could not requeue running process: {}", err);
        }
    }
}

fn exit<A: MemoryAllocator>(scheduler: &mut Scheduler<A>) {
    scheduler.free_all_queued();
    if let Some(current) = scheduler.current.take() {
        let name = scheduler.get(current).map(Pcb::name).unwrap_or_default();
        debug!("exiting {}", name);
        if let Err(err) = scheduler.free(current) {
            warn!("could not free running process: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::{
        config::Config,
        memory::leaked_heap,
        process::{ExecState, PcbHandle, ProcessClass},
    };
    use alloc::{sync::Arc, vec, vec::Vec};
    use linked_list_allocator::LockedHeap;

    fn scheduler() -> Scheduler<Arc<LockedHeap>> {
        let config = Config {
            stack_size: 512,
            ..Config::default()
        };
        Scheduler::with_config(leaked_heap(64 * 1024), config)
    }

    fn spawn(s: &mut Scheduler<Arc<LockedHeap>>, name: &str, priority: i32) -> PcbHandle {
        let h = s.setup(name, ProcessClass::User, priority).unwrap();
        s.insert(h).unwrap();
        h
    }

    fn at(eip: u32, request: i32) -> Context {
        Context {
            eip,
            ..Context::with_request(request)
        }
    }

    #[test]
    fn idle_with_nothing_ready_returns_to_idle_point() {
        let mut s = scheduler();
        let kernel = at(0x1000, IDLE);
        assert_eq!(dispatch(&mut s, kernel), kernel);
        assert!(s.idle_context.is_none());
        assert!(s.current().is_none());
    }

    #[test]
    fn round_robin_between_equal_priorities() {
        let mut s = scheduler();
        let a = spawn(&mut s, "a", 1);
        let b = spawn(&mut s, "b", 1);
        let kernel = at(0x1000, IDLE);

        assert_eq!(dispatch(&mut s, kernel), Context::default());
        assert_eq!(s.current(), Some(a));
        assert_eq!(s.ready().collect::<Vec<_>>(), vec![b]);

        let from_a = at(0xA0, IDLE);
        dispatch(&mut s, from_a);
        assert_eq!(s.current(), Some(b));
        assert_eq!(s.ready().collect::<Vec<_>>(), vec![a]);
        assert_eq!(s.get(a).unwrap().context(), from_a);

        // back to a, resuming exactly where it idled
        assert_eq!(dispatch(&mut s, at(0xB0, IDLE)), from_a);
        assert_eq!(s.current(), Some(a));
    }

    #[test]
    fn unknown_request_returns_to_caller() {
        let mut s = scheduler();
        let a = spawn(&mut s, "a", 1);
        let b = spawn(&mut s, "b", 2);
        s.block(b).unwrap();

        let caller = at(0x42, 7);
        let resumed = dispatch(&mut s, caller);
        assert_eq!(resumed, Context { eax: EUNKNOWN, ..caller });
        assert_eq!(s.ready().collect::<Vec<_>>(), vec![a]);
        assert_eq!(s.blocked().collect::<Vec<_>>(), vec![b]);
        assert!(s.idle_context.is_none());
    }

    #[test]
    fn exit_frees_everything() {
        let mut s = scheduler();
        let kernel = at(0x1000, IDLE);
        spawn(&mut s, "a", 1);
        spawn(&mut s, "b", 3);
        let c = spawn(&mut s, "c", 5);
        s.block(c).unwrap();
        spawn(&mut s, "d", 0);

        dispatch(&mut s, kernel);
        assert!(s.current().is_some());

        let resumed = dispatch(&mut s, at(0xD0, EXIT));
        assert_eq!(resumed, kernel);
        assert_eq!(s.ready().count(), 0);
        assert_eq!(s.blocked().count(), 0);
        assert!(s.current().is_none());

        // every stack went back to the heap
        let big = s.allocator().alloc(32 * 1024);
        assert!(big.is_some());
    }

    #[test]
    fn exit_frees_a_caller_blocked_on_io() {
        let mut s = scheduler();
        let kernel = at(0x1000, IDLE);
        let a = spawn(&mut s, "a", 1);
        let b = spawn(&mut s, "b", 2);
        s.block(b).unwrap();
        dispatch(&mut s, kernel);
        assert_eq!(s.block_current(), Ok(a));

        assert_eq!(dispatch(&mut s, at(0xA0, EXIT)), kernel);
        assert!(s.get(a).is_none());
        assert!(s.get(b).is_none());
        assert!(s.allocator().alloc(32 * 1024).is_some());
    }

    #[test]
    fn suspended_head_blocks_selection() {
        let mut s = scheduler();
        let a = spawn(&mut s, "a", 0);
        let b = spawn(&mut s, "b", 1);
        s.suspend(a).unwrap();
        assert!(s.has_runnable());

        let kernel = at(0x1000, IDLE);
        assert_eq!(dispatch(&mut s, kernel), kernel);
        assert!(s.current().is_none());
        assert_eq!(s.ready().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn blocked_caller_is_parked_on_idle() {
        let mut s = scheduler();
        let a = spawn(&mut s, "a", 1);
        let b = spawn(&mut s, "b", 1);
        dispatch(&mut s, at(0x1000, IDLE));
        assert_eq!(s.block_current(), Ok(a));

        dispatch(&mut s, at(0xA0, IDLE));
        assert_eq!(s.current(), Some(b));
        assert_eq!(s.blocked().collect::<Vec<_>>(), vec![a]);
        assert_eq!(s.ready().count(), 0);
        assert_eq!(s.get(a).unwrap().exec_state(), ExecState::Blocked);
    }

    #[test]
    fn idle_point_is_captured_once() {
        let mut s = scheduler();
        spawn(&mut s, "a", 1);
        let kernel = at(0x1000, IDLE);
        dispatch(&mut s, kernel);
        // a is running and idles again; the idle point must not move
        dispatch(&mut s, at(0xA0, IDLE));
        assert_eq!(s.idle_context, Some(kernel));
    }
}
