#![warn(missing_docs)]

/// config module, sizes and limits
pub mod config;
/// context module, the saved register snapshot
pub mod context;
/// interrupts module, handles IRQ routing
pub mod interrupts;
/// io module, port and interrupt-controller access
pub mod io;
/// kernel module, ties the scheduler and the serial driver together
pub mod kernel;
/// memory module, handles stack and buffer allocation
pub mod memory;
/// process module, handles process control blocks and their queues
pub mod process;
/// serial module, handles console output
pub mod serial;
/// serial_io module, interrupt-driven serial I/O
pub mod serial_io;
/// sim module, a simulated machine for tests
pub mod sim;
/// syscall module, handles system calls and dispatching
pub mod syscall;
/// uart module, handles polled serial I/O
pub mod uart;
