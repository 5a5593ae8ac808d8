use core::fmt::{self, Display, Formatter};

use alloc::{collections::VecDeque, string::String, vec::Vec};
use log::{debug, error, trace, warn};

use super::{
    config::{Config, MAX_NAME_LEN, MAX_PRIORITY},
    context::{CONTEXT_SIZE, Context},
    memory::{Block, MemoryAllocator},
};

/// errors raised by process control block operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcbError {
    /// malformed name or priority
    InvalidArgument,
    /// the allocator could not provide a stack
    AllocationFailure,
    /// the PCB is not in the queue its state says it should be in
    NotFound,
    /// the PCB is in a state incompatible with the operation
    InvalidState,
    /// the handle refers to a PCB that has been freed
    StaleHandle,
}

impl PcbError {
    /// negative sentinel used on the integer system-call surface
    pub fn as_errno(self) -> isize {
        match self {
            PcbError::InvalidArgument => -1,
            PcbError::AllocationFailure => -2,
            PcbError::NotFound => -3,
            PcbError::InvalidState => -4,
            PcbError::StaleHandle => -5,
        }
    }
}

impl Display for PcbError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let msg = match self {
            PcbError::InvalidArgument => "invalid PCB argument",
            PcbError::AllocationFailure => "failed to allocate PCB stack",
            PcbError::NotFound => "PCB not found in its queue",
            PcbError::InvalidState => "PCB in wrong state",
            PcbError::StaleHandle => "stale PCB handle",
        };
        f.write_str(msg)
    }
}

/// scheduling class of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessClass {
    /// kernel-side process
    System,
    /// application process
    User,
}

/// execution state, decides which queue a PCB lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// waiting to be dispatched
    Ready,
    /// waiting on an event
    Blocked,
}

/// suspend flag, orthogonal to the execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// not eligible for dispatch
    Suspended,
    /// eligible for dispatch when ready
    NotSuspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queue {
    Ready,
    Blocked,
}

/// Stable reference to a PCB in the scheduler's arena.
///
/// The generation makes handles to freed PCBs fail instead of aliasing a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcbHandle {
    index: usize,
    generation: u32,
}

/// A freshly allocated, zeroed process stack with room for one saved context at the top.
#[derive(Debug)]
pub struct ProcessStack {
    block: Block,
    stack_pointer: usize,
}

impl ProcessStack {
    /// offset of the saved context within the stack
    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer
    }

    /// size of the stack in bytes
    pub fn len(&self) -> usize {
        self.block.len()
    }

    /// stacks are never empty, they always hold a context
    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    /// the saved context
    pub fn context(&self) -> Context {
        let bytes = &self.block.as_slice()[self.stack_pointer..self.stack_pointer + CONTEXT_SIZE];
        unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const Context) }
    }

    /// overwrite the saved context
    pub fn save(&mut self, ctx: &Context) {
        let sp = self.stack_pointer;
        let bytes = &mut self.block.as_mut_slice()[sp..sp + CONTEXT_SIZE];
        unsafe { core::ptr::write_unaligned(bytes.as_mut_ptr() as *mut Context, *ctx) }
    }

    fn clear_context(&mut self) {
        let sp = self.stack_pointer;
        self.block.as_mut_slice()[sp..sp + CONTEXT_SIZE].fill(0);
    }
}

/// process control block
#[derive(Debug)]
pub struct Pcb {
    name: String,
    class: ProcessClass,
    priority: u8,
    exec_state: ExecState,
    dispatch_state: DispatchState,
    stack: ProcessStack,
    queued: Option<Queue>,
}

impl Pcb {
    /// process name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// scheduling class
    pub fn class(&self) -> ProcessClass {
        self.class
    }

    /// priority, 0 runs first
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// ready or blocked
    pub fn exec_state(&self) -> ExecState {
        self.exec_state
    }

    /// suspended or not
    pub fn dispatch_state(&self) -> DispatchState {
        self.dispatch_state
    }

    /// the context the process resumes with
    pub fn context(&self) -> Context {
        self.stack.context()
    }

    /// the process stack
    pub fn stack(&self) -> &ProcessStack {
        &self.stack
    }

    /// true while the PCB sits in the ready or blocked queue
    pub fn is_queued(&self) -> bool {
        self.queued.is_some()
    }

    fn runnable(&self) -> bool {
        self.exec_state == ExecState::Ready && self.dispatch_state == DispatchState::NotSuspended
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    pcb: Option<Pcb>,
}

/// Owner of every PCB, the two queues and the dispatcher's state.
///
/// All process management goes through one `Scheduler`; there are no global queue roots.
pub struct Scheduler<A: MemoryAllocator> {
    allocator: A,
    config: Config,
    slots: Vec<Slot>,
    ready: VecDeque<PcbHandle>,
    blocked: VecDeque<PcbHandle>,
    pub(crate) current: Option<PcbHandle>,
    pub(crate) idle_context: Option<Context>,
}

fn validate(name: &str, priority: i32) -> Result<u8, PcbError> {
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        error!("Error: Invalid PCB setup parameters. Name length = {}", len);
        return Err(PcbError::InvalidArgument);
    }
    validate_priority(priority)
}

fn validate_priority(priority: i32) -> Result<u8, PcbError> {
    if priority < 0 || priority > MAX_PRIORITY as i32 {
        error!("Error: Invalid PCB setup parameters. Priority = {}", priority);
        return Err(PcbError::InvalidArgument);
    }
    Ok(priority as u8)
}

impl<A: MemoryAllocator> Scheduler<A> {
    /// create a scheduler with the kernel's default sizes
    pub fn new(allocator: A) -> Self {
        Self::with_config(allocator, Config::default())
    }

    /// create a scheduler with custom sizes
    pub fn with_config(allocator: A, config: Config) -> Self {
        Scheduler {
            allocator,
            config,
            slots: Vec::new(),
            ready: VecDeque::new(),
            blocked: VecDeque::new(),
            current: None,
            idle_context: None,
        }
    }

    /// the allocator stacks are drawn from
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// allocate a zeroed stack with the context slot at its top
    pub fn allocate(&self) -> Result<ProcessStack, PcbError> {
        let size = self.config.stack_size;
        if size < CONTEXT_SIZE {
            error!("Error: stack of {} bytes cannot hold a context", size);
            return Err(PcbError::InvalidArgument);
        }
        let mut block = self.allocator.alloc(size).ok_or_else(|| {
            error!("Error: Failed to allocate memory for new PCB.");
            PcbError::AllocationFailure
        })?;
        block.as_mut_slice().fill(0);
        Ok(ProcessStack {
            block,
            stack_pointer: size - CONTEXT_SIZE,
        })
    }

    /// hand back a stack that never made it into a PCB
    pub fn release(&self, stack: ProcessStack) {
        self.allocator.free(stack.block);
    }

    /// Create a READY, not suspended PCB. The caller must `insert` it.
    pub fn setup(
        &mut self,
        name: &str,
        class: ProcessClass,
        priority: i32,
    ) -> Result<PcbHandle, PcbError> {
        let priority = validate(name, priority)?;
        let mut stack = self.allocate()?;
        stack.clear_context();

        let pcb = Pcb {
            name: String::from(name),
            class,
            priority,
            exec_state: ExecState::Ready,
            dispatch_state: DispatchState::NotSuspended,
            stack,
            queued: None,
        };

        let index = match self.slots.iter().position(|slot| slot.pcb.is_none()) {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        slot.pcb = Some(pcb);
        debug!("set up PCB {} (priority {})", name, priority);
        Ok(PcbHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Release a PCB's stack and its arena slot.
    ///
    /// The PCB must already be detached from both queues and must not be the running process.
    pub fn free(&mut self, handle: PcbHandle) -> Result<(), PcbError> {
        let pcb = self.pcb(handle)?;
        if pcb.is_queued() || self.current == Some(handle) {
            error!("Error: Attempted to free attached PCB {}", pcb.name);
            return Err(PcbError::InvalidState);
        }
        let slot = &mut self.slots[handle.index];
        if let Some(pcb) = slot.pcb.take() {
            slot.generation = slot.generation.wrapping_add(1);
            trace!("freeing PCB {}", pcb.name);
            self.allocator.free(pcb.stack.block);
        }
        Ok(())
    }

    /// look up a PCB by handle
    pub fn get(&self, handle: PcbHandle) -> Option<&Pcb> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.pcb.as_ref())
    }

    fn pcb(&self, handle: PcbHandle) -> Result<&Pcb, PcbError> {
        self.get(handle).ok_or_else(|| {
            error!("Error: stale PCB handle {:?}", handle);
            PcbError::StaleHandle
        })
    }

    fn pcb_mut(&mut self, handle: PcbHandle) -> Result<&mut Pcb, PcbError> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.pcb.as_mut())
            .ok_or_else(|| {
                error!("Error: stale PCB handle {:?}", handle);
                PcbError::StaleHandle
            })
    }

    /// find a queued PCB by name, searching the ready queue before the blocked queue
    pub fn find(&self, name: &str) -> Result<PcbHandle, PcbError> {
        self.ready
            .iter()
            .chain(self.blocked.iter())
            .copied()
            .find(|&handle| self.get(handle).is_some_and(|pcb| pcb.name == name))
            .ok_or_else(|| {
                error!("Error: PCB not found in any queue. Searched for: Name = {}", name);
                PcbError::NotFound
            })
    }

    /// Queue a PCB according to its execution state.
    ///
    /// Ready PCBs go after every entry of equal or lower priority value; blocked PCBs go to
    /// the head.
    pub fn insert(&mut self, handle: PcbHandle) -> Result<(), PcbError> {
        let pcb = self.pcb(handle)?;
        if pcb.is_queued() || self.current == Some(handle) {
            error!("Error: PCB {} is running or already queued", pcb.name);
            return Err(PcbError::InvalidState);
        }
        let (state, priority) = (pcb.exec_state, pcb.priority);

        let queue = match state {
            ExecState::Blocked => {
                self.blocked.push_front(handle);
                Queue::Blocked
            }
            ExecState::Ready => {
                let slots = &self.slots;
                let at = self
                    .ready
                    .iter()
                    .position(|h| {
                        slots[h.index]
                            .pcb
                            .as_ref()
                            .is_some_and(|queued| queued.priority > priority)
                    })
                    .unwrap_or(self.ready.len());
                self.ready.insert(at, handle);
                Queue::Ready
            }
        };
        self.pcb_mut(handle)?.queued = Some(queue);
        Ok(())
    }

    /// Take a PCB out of the queue its execution state selects. The other queue is never searched.
    pub fn remove(&mut self, handle: PcbHandle) -> Result<(), PcbError> {
        let state = self.pcb(handle)?.exec_state;
        let queue = match state {
            ExecState::Ready => &mut self.ready,
            ExecState::Blocked => &mut self.blocked,
        };
        match queue.iter().position(|&h| h == handle) {
            Some(at) => {
                queue.remove(at);
                self.pcb_mut(handle)?.queued = None;
                Ok(())
            }
            None => {
                error!(
                    "Error: Target PCB not found in its respective queue. Target Name = {}",
                    self.get(handle).map(Pcb::name).unwrap_or_default()
                );
                Err(PcbError::NotFound)
            }
        }
    }

    /// Clear the suspend flag; a blocked PCB is also moved to the ready queue.
    pub fn resume(&mut self, handle: PcbHandle) -> Result<(), PcbError> {
        let pcb = self.pcb(handle)?;
        if pcb.dispatch_state != DispatchState::Suspended {
            error!("Error: PCB is not suspended and cannot be resumed. PCB Name = {}", pcb.name);
            return Err(PcbError::InvalidState);
        }
        let blocked = pcb.exec_state == ExecState::Blocked;
        if blocked {
            self.remove(handle)?;
        }
        let pcb = self.pcb_mut(handle)?;
        pcb.dispatch_state = DispatchState::NotSuspended;
        if blocked {
            pcb.exec_state = ExecState::Ready;
            self.insert(handle)?;
        }
        Ok(())
    }

    /// set the suspend flag, the PCB stays where it is
    pub fn suspend(&mut self, handle: PcbHandle) -> Result<(), PcbError> {
        let pcb = self.pcb_mut(handle)?;
        if pcb.dispatch_state == DispatchState::Suspended {
            error!("Error: PCB {} is already suspended", pcb.name);
            return Err(PcbError::InvalidState);
        }
        pcb.dispatch_state = DispatchState::Suspended;
        Ok(())
    }

    /// move a queued ready PCB to the blocked queue
    pub fn block(&mut self, handle: PcbHandle) -> Result<(), PcbError> {
        self.move_to(handle, ExecState::Ready, ExecState::Blocked)
    }

    /// move a blocked PCB back to the ready queue
    pub fn unblock(&mut self, handle: PcbHandle) -> Result<(), PcbError> {
        self.move_to(handle, ExecState::Blocked, ExecState::Ready)
    }

    fn move_to(
        &mut self,
        handle: PcbHandle,
        from: ExecState,
        to: ExecState,
    ) -> Result<(), PcbError> {
        let pcb = self.pcb(handle)?;
        if pcb.exec_state != from {
            error!("Error: PCB {} is {:?}, expected {:?}", pcb.name, pcb.exec_state, from);
            return Err(PcbError::InvalidState);
        }
        self.remove(handle)?;
        self.pcb_mut(handle)?.exec_state = to;
        self.insert(handle)
    }

    /// change a PCB's priority, keeping the ready queue ordered
    pub fn set_priority(&mut self, handle: PcbHandle, priority: i32) -> Result<(), PcbError> {
        let priority = validate_priority(priority)?;
        let pcb = self.pcb(handle)?;
        let requeue = pcb.queued == Some(Queue::Ready);
        if requeue {
            self.remove(handle)?;
        }
        self.pcb_mut(handle)?.priority = priority;
        if requeue {
            self.insert(handle)?;
        }
        Ok(())
    }

    /// handles in the ready queue, head first
    pub fn ready(&self) -> impl Iterator<Item = PcbHandle> + '_ {
        self.ready.iter().copied()
    }

    /// handles in the blocked queue, head first
    pub fn blocked(&self) -> impl Iterator<Item = PcbHandle> + '_ {
        self.blocked.iter().copied()
    }

    /// the running process, if any
    pub fn current(&self) -> Option<PcbHandle> {
        self.current
    }

    /// Mark the running process BLOCKED.
    ///
    /// It keeps the CPU until its next IDLE, which parks it in the blocked queue.
    pub fn block_current(&mut self) -> Result<PcbHandle, PcbError> {
        let Some(current) = self.current else {
            error!("Error: no running process to block");
            return Err(PcbError::InvalidState);
        };
        self.set_exec_state(current, ExecState::Blocked)?;
        trace!("blocking running process");
        Ok(current)
    }

    /// Make a BLOCKED PCB ready again, wherever it is.
    ///
    /// The running process just flips back to READY; a queued one moves to the ready queue,
    /// through `resume` when it is also suspended. Returns false if it was not blocked.
    pub fn wake(&mut self, handle: PcbHandle) -> Result<bool, PcbError> {
        let pcb = self.pcb(handle)?;
        if pcb.exec_state != ExecState::Blocked {
            return Ok(false);
        }
        if self.current == Some(handle) {
            self.set_exec_state(handle, ExecState::Ready)?;
        } else if pcb.dispatch_state == DispatchState::Suspended {
            self.resume(handle)?;
        } else {
            self.unblock(handle)?;
        }
        Ok(true)
    }

    /// true if any PCB anywhere in the ready queue is ready and not suspended
    pub fn has_runnable(&self) -> bool {
        self.ready().any(|h| self.get(h).is_some_and(Pcb::runnable))
    }

    /// dequeue the head of the ready queue if, and only if, the head itself is runnable
    pub(crate) fn take_runnable_head(&mut self) -> Option<PcbHandle> {
        let head = *self.ready.front()?;
        if !self.get(head).is_some_and(Pcb::runnable) {
            return None;
        }
        self.remove(head).ok()?;
        Some(head)
    }

    /// overwrite a PCB's saved context
    pub(crate) fn save_context(
        &mut self,
        handle: PcbHandle,
        ctx: &Context,
    ) -> Result<(), PcbError> {
        self.pcb_mut(handle)?.stack.save(ctx);
        Ok(())
    }

    pub(crate) fn set_exec_state(
        &mut self,
        handle: PcbHandle,
        state: ExecState,
    ) -> Result<(), PcbError> {
        self.pcb_mut(handle)?.exec_state = state;
        Ok(())
    }

    /// detach and free every queued PCB
    pub(crate) fn free_all_queued(&mut self) {
        let queued: Vec<PcbHandle> = self.ready.drain(..).chain(self.blocked.drain(..)).collect();
        for handle in queued {
            if let Ok(pcb) = self.pcb_mut(handle) {
                pcb.queued = None;
            }
            if let Err(err) = self.free(handle) {
                warn!("could not free queued process: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::memory::leaked_heap;
    use alloc::{sync::Arc, vec};
    use linked_list_allocator::LockedHeap;

    fn scheduler() -> Scheduler<Arc<LockedHeap>> {
        let config = Config {
            stack_size: 256,
            ..Config::default()
        };
        Scheduler::with_config(leaked_heap(64 * 1024), config)
    }

    fn spawn(s: &mut Scheduler<Arc<LockedHeap>>, name: &str, priority: i32) -> PcbHandle {
        let h = s.setup(name, ProcessClass::User, priority).unwrap();
        s.insert(h).unwrap();
        h
    }

    fn names(s: &Scheduler<Arc<LockedHeap>>) -> Vec<&str> {
        s.ready().map(|h| s.get(h).unwrap().name()).collect()
    }

    #[test]
    fn setup_rejects_bad_arguments() {
        let mut s = scheduler();
        for priority in [0, 9] {
            assert!(s.setup("ok", ProcessClass::System, priority).is_ok());
        }
        for priority in [10, -1] {
            assert_eq!(
                s.setup("bad", ProcessClass::System, priority),
                Err(PcbError::InvalidArgument)
            );
        }
        assert!(s.setup("abcdefghijklmno", ProcessClass::User, 1).is_ok());
        assert_eq!(
            s.setup("abcdefghijklmnop", ProcessClass::User, 1),
            Err(PcbError::InvalidArgument)
        );
        assert_eq!(s.setup("", ProcessClass::User, 1), Err(PcbError::InvalidArgument));
    }

    #[test]
    fn setup_zeroes_context_and_leaves_pcb_unqueued() {
        let mut s = scheduler();
        let h = s.setup("init", ProcessClass::System, 0).unwrap();
        let pcb = s.get(h).unwrap();
        assert_eq!(pcb.context(), Context::default());
        assert_eq!(pcb.stack().stack_pointer(), 256 - CONTEXT_SIZE);
        assert_eq!(pcb.exec_state(), ExecState::Ready);
        assert_eq!(pcb.dispatch_state(), DispatchState::NotSuspended);
        assert!(!pcb.is_queued());
        assert_eq!(s.find("init"), Err(PcbError::NotFound));
    }

    #[test]
    fn allocation_failure_is_reported() {
        let config = Config {
            stack_size: 4096,
            ..Config::default()
        };
        let mut s = Scheduler::with_config(leaked_heap(2048), config);
        assert_eq!(
            s.setup("big", ProcessClass::User, 3),
            Err(PcbError::AllocationFailure)
        );
    }

    #[test]
    fn ready_queue_orders_by_priority_then_fifo() {
        let mut s = scheduler();
        spawn(&mut s, "c5", 5);
        spawn(&mut s, "a1", 1);
        spawn(&mut s, "d5", 5);
        spawn(&mut s, "b1", 1);
        spawn(&mut s, "z0", 0);
        spawn(&mut s, "e9", 9);
        assert_eq!(names(&s), vec!["z0", "a1", "b1", "c5", "d5", "e9"]);
    }

    #[test]
    fn reinsertion_goes_behind_equal_priorities() {
        let mut s = scheduler();
        let a = spawn(&mut s, "a", 2);
        spawn(&mut s, "b", 2);
        spawn(&mut s, "c", 3);
        s.remove(a).unwrap();
        s.insert(a).unwrap();
        assert_eq!(names(&s), vec!["b", "a", "c"]);
    }

    #[test]
    fn blocked_queue_pushes_at_head() {
        let mut s = scheduler();
        let a = spawn(&mut s, "a", 4);
        let b = spawn(&mut s, "b", 1);
        s.block(a).unwrap();
        s.block(b).unwrap();
        let blocked: Vec<_> = s.blocked().collect();
        assert_eq!(blocked, vec![b, a]);
        assert_eq!(s.ready().count(), 0);
        assert_eq!(s.find("a"), Ok(a));
    }

    #[test]
    fn insert_twice_is_rejected() {
        let mut s = scheduler();
        let a = spawn(&mut s, "a", 4);
        assert_eq!(s.insert(a), Err(PcbError::InvalidState));
    }

    #[test]
    fn remove_only_searches_matching_queue() {
        let mut s = scheduler();
        let a = s.setup("a", ProcessClass::User, 4).unwrap();
        assert_eq!(s.remove(a), Err(PcbError::NotFound));
        s.insert(a).unwrap();
        s.set_exec_state(a, ExecState::Blocked).unwrap();
        assert_eq!(s.remove(a), Err(PcbError::NotFound));
    }

    #[test]
    fn resume_moves_blocked_to_ready() {
        let mut s = scheduler();
        let a = spawn(&mut s, "a", 4);
        assert_eq!(s.resume(a), Err(PcbError::InvalidState));

        s.block(a).unwrap();
        s.suspend(a).unwrap();
        assert_eq!(s.suspend(a), Err(PcbError::InvalidState));
        s.resume(a).unwrap();

        let pcb = s.get(a).unwrap();
        assert_eq!(pcb.exec_state(), ExecState::Ready);
        assert_eq!(pcb.dispatch_state(), DispatchState::NotSuspended);
        assert_eq!(s.ready().collect::<Vec<_>>(), vec![a]);
        assert_eq!(s.blocked().count(), 0);
    }

    #[test]
    fn resume_of_ready_pcb_keeps_position() {
        let mut s = scheduler();
        let a = spawn(&mut s, "a", 1);
        spawn(&mut s, "b", 2);
        s.suspend(a).unwrap();
        assert!(s.has_runnable());
        s.resume(a).unwrap();
        assert_eq!(names(&s), vec!["a", "b"]);
    }

    #[test]
    fn set_priority_reorders() {
        let mut s = scheduler();
        spawn(&mut s, "a", 1);
        let b = spawn(&mut s, "b", 5);
        s.set_priority(b, 0).unwrap();
        assert_eq!(names(&s), vec!["b", "a"]);
        assert_eq!(s.set_priority(b, 12), Err(PcbError::InvalidArgument));
    }

    #[test]
    fn freed_handles_go_stale() {
        let mut s = scheduler();
        let a = spawn(&mut s, "a", 1);
        assert_eq!(s.free(a), Err(PcbError::InvalidState));
        s.remove(a).unwrap();
        s.free(a).unwrap();
        assert!(s.get(a).is_none());
        assert_eq!(s.insert(a), Err(PcbError::StaleHandle));

        let b = spawn(&mut s, "b", 1);
        assert_ne!(a, b);
        assert_eq!(s.find("b"), Ok(b));
    }

    #[test]
    fn block_current_needs_a_running_process() {
        let mut s = scheduler();
        assert_eq!(s.block_current(), Err(PcbError::InvalidState));
        let a = spawn(&mut s, "a", 1);
        assert_eq!(s.take_runnable_head(), Some(a));
        s.current = Some(a);
        assert_eq!(s.block_current(), Ok(a));
        assert_eq!(s.get(a).unwrap().exec_state(), ExecState::Blocked);
        assert!(!s.get(a).unwrap().is_queued());
    }

    #[test]
    fn wake_handles_running_queued_and_suspended() {
        let mut s = scheduler();
        let running = s.setup("running", ProcessClass::User, 1).unwrap();
        s.current = Some(running);
        s.block_current().unwrap();
        assert_eq!(s.wake(running), Ok(true));
        assert_eq!(s.get(running).unwrap().exec_state(), ExecState::Ready);
        assert_eq!(s.ready().count(), 0);

        let parked = spawn(&mut s, "parked", 2);
        s.block(parked).unwrap();
        assert_eq!(s.wake(parked), Ok(true));
        assert_eq!(s.ready().collect::<Vec<_>>(), vec![parked]);
        assert_eq!(s.wake(parked), Ok(false));

        let sleeping = spawn(&mut s, "sleeping", 3);
        s.block(sleeping).unwrap();
        s.suspend(sleeping).unwrap();
        assert_eq!(s.wake(sleeping), Ok(true));
        let pcb = s.get(sleeping).unwrap();
        assert_eq!(pcb.dispatch_state(), DispatchState::NotSuspended);
        assert_eq!(names(&s), vec!["parked", "sleeping"]);
    }
}
