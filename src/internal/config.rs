//! Sizes and limits shared by the scheduler and the serial driver.

/// bytes of stack owned by every process control block
pub const STACK_SIZE: usize = 6700;
/// longest accepted process name
pub const MAX_NAME_LEN: usize = 15;
/// highest (least urgent) process priority; 0 is the most urgent
pub const MAX_PRIORITY: u8 = 9;

/// number of serial lines the driver knows about
pub const MAX_DEVICES: usize = 4;
/// bytes allocated for each device's ring buffer
pub const RING_BUFFER_SIZE: usize = 256;
/// bytes of the ring buffer actually used for buffered input
pub const RING_CAPACITY: usize = 150;
/// largest single write request
pub const MAX_WRITE_LEN: usize = 100;

/// input clock of the UART, the divisor latch is computed against this
pub const UART_CLOCK: u32 = 115_200;
/// baud rate programmed by `uart::init`
pub const DEFAULT_BAUD: u32 = 9600;

/// Runtime sizing for the scheduler and the serial driver.
///
/// `Config::default()` yields the kernel's real values; tests shrink them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// stack bytes per process
    pub stack_size: usize,
    /// bytes allocated per ring buffer
    pub ring_buffer_size: usize,
    /// usable bytes of each ring buffer, never more than `ring_buffer_size`
    pub ring_capacity: usize,
    /// largest accepted write
    pub max_write_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            stack_size: STACK_SIZE,
            ring_buffer_size: RING_BUFFER_SIZE,
            ring_capacity: RING_CAPACITY,
            max_write_len: MAX_WRITE_LEN,
        }
    }
}

impl Config {
    /// clamp the usable ring capacity to the allocated ring size
    pub fn ring_capacity(&self) -> usize {
        self.ring_capacity.min(self.ring_buffer_size)
    }
}
