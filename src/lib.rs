//! A small teaching kernel core: priority scheduling of process control blocks, a
//! dispatcher driven by IDLE/EXIT system calls, and an interrupt-driven driver for the
//! four PC serial lines.
//!
//! The hardware sits behind [`Platform`], so everything except the boot wiring in
//! [`init`] also runs against [`SimPlatform`].
#![cfg_attr(not(test), no_std)]

/// import the allocator crate
extern crate alloc;

/// internal modules, not exposed to userspace
pub mod internal;

pub use internal::{
    config::Config,
    context::Context,
    interrupts::{InterruptHandler, dispatch_irq, set_irq_handler},
    io::{InterruptControl, Pc, Platform, PortIo},
    kernel::Kernel,
    memory::{Block, MemoryAllocator},
    process::{DispatchState, ExecState, Pcb, PcbError, PcbHandle, ProcessClass, Scheduler},
    serial_io::{Completion, Iocb, Operation, PortStatus, SerialIo},
    sim::SimPlatform,
    syscall::{EUNKNOWN, EXIT, IDLE},
    uart::{Device, SerialError, Uart},
};

use linked_list_allocator::LockedHeap;
use log::{Level, LevelFilter, Metadata, Record, info};
use spin::Mutex;

/// Kernel heap: backs `alloc` on bare metal and every stack and ring buffer.
#[cfg_attr(target_os = "none", global_allocator)]
pub static HEAP: LockedHeap = LockedHeap::empty();

/// The kernel instance the serial IRQs are routed to, set by [`init`].
pub static KERNEL: Mutex<Option<Kernel<Pc, &'static LockedHeap>>> = Mutex::new(None);

/// A logger that writes to the kernel console on COM1.
pub struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        // formatted straight to the port, the logger may run inside an interrupt handler
        serial_println!("[ {} ] {}", level, record.args());
    }

    fn flush(&self) {}
}

#[cfg(feature = "trace_log")]
const LOG_LEVEL: LevelFilter = LevelFilter::Trace;

#[cfg(all(feature = "debug_log", not(feature = "trace_log")))]
const LOG_LEVEL: LevelFilter = LevelFilter::Debug;

#[cfg(all(feature = "warn_log", not(any(feature = "trace_log", feature = "debug_log"))))]
const LOG_LEVEL: LevelFilter = LevelFilter::Warn;

#[cfg(all(
    feature = "error_log",
    not(any(feature = "trace_log", feature = "debug_log", feature = "warn_log"))
))]
const LOG_LEVEL: LevelFilter = LevelFilter::Error;

#[cfg(not(any(
    feature = "trace_log",
    feature = "debug_log",
    feature = "warn_log",
    feature = "error_log"
)))]
const LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Install [`SerialLogger`] at the level picked by the `*_log` features.
pub fn init_logger() {
    // a second call keeps the logger already installed
    if log::set_logger(&SerialLogger).is_ok() {
        log::set_max_level(LOG_LEVEL);
    }
}

fn serial_irq(irq: u8) {
    if let Some(kernel) = KERNEL.lock().as_mut() {
        kernel.serial_mut().handle_interrupt(irq);
    }
}

/// Run `f` on the kernel instance with interrupts held off, `None` before [`init`].
pub fn with_kernel<R>(f: impl FnOnce(&mut Kernel<Pc, &'static LockedHeap>) -> R) -> Option<R> {
    x86_64::instructions::interrupts::without_interrupts(|| KERNEL.lock().as_mut().map(f))
}

/// Bring the kernel up on real hardware.
///
/// The embedding kernel's IDT stubs must call [`dispatch_irq`] for IRQ 3 and 4.
///
/// # Safety
/// `heap_start..heap_start + heap_size` must be unused, writable memory owned by the kernel
/// from now on, and `init` may only be called once.
pub unsafe fn init(heap_start: *mut u8, heap_size: usize) {
    init_logger();

    unsafe { HEAP.lock().init(heap_start, heap_size) };
    info!("Heap initialized");

    let mut pc = unsafe { Pc::new() };
    pc.init_pics();
    info!("PICs initialized");

    x86_64::instructions::interrupts::without_interrupts(|| {
        *KERNEL.lock() = Some(Kernel::new(pc, &HEAP));
    });
    for dev in [Device::Com1, Device::Com2] {
        set_irq_handler(dev.irq(), serial_irq);
    }
    info!("Serial IRQs routed");

    x86_64::instructions::interrupts::enable();
    info!("Kernel initialized");
}
