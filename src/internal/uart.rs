use core::fmt::{self, Display, Formatter};

use bit_field::BitField;
use bitflags::bitflags;
use log::{debug, trace};

use super::{
    config::{DEFAULT_BAUD, MAX_DEVICES, UART_CLOCK},
    io::PortIo,
};

/// register offsets from a UART's base port
pub mod reg {
    /// receive buffer (read)
    pub const RBR: u16 = 0;
    /// transmit holding (write)
    pub const THR: u16 = 0;
    /// divisor latch low byte (DLAB set)
    pub const DLL: u16 = 0;
    /// interrupt enable
    pub const IER: u16 = 1;
    /// divisor latch high byte (DLAB set)
    pub const DLM: u16 = 1;
    /// interrupt identification (read)
    pub const IIR: u16 = 2;
    /// FIFO control (write)
    pub const FCR: u16 = 2;
    /// line control
    pub const LCR: u16 = 3;
    /// modem control
    pub const MCR: u16 = 4;
    /// line status
    pub const LSR: u16 = 5;
    /// modem status
    pub const MSR: u16 = 6;
    /// scratch
    pub const SCR: u16 = 7;
}

bitflags! {
    /// interrupt enable register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterruptEnable: u8 {
        /// received data available
        const DATA_READY = 1 << 0;
        /// transmit holding register empty
        const TRANSMIT_EMPTY = 1 << 1;
        /// receiver line status
        const LINE_STATUS = 1 << 2;
        /// modem status
        const MODEM_STATUS = 1 << 3;
    }

    /// line control register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineControl: u8 {
        /// 8 data bits
        const DATA_8 = 0b11;
        /// two stop bits
        const STOP_2 = 1 << 2;
        /// parity enable
        const PARITY = 1 << 3;
        /// divisor latch access
        const DLAB = 1 << 7;
    }

    /// FIFO control register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FifoControl: u8 {
        /// enable both FIFOs
        const ENABLE = 1 << 0;
        /// clear the receive FIFO
        const CLEAR_RX = 1 << 1;
        /// clear the transmit FIFO
        const CLEAR_TX = 1 << 2;
        /// interrupt at 14 bytes
        const TRIGGER_14 = 0b11 << 6;
    }

    /// modem control register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModemControl: u8 {
        /// data terminal ready
        const DTR = 1 << 0;
        /// request to send
        const RTS = 1 << 1;
        /// auxiliary output 1
        const OUT1 = 1 << 2;
        /// auxiliary output 2, gates the IRQ line
        const OUT2 = 1 << 3;
        /// loopback mode
        const LOOPBACK = 1 << 4;
    }

    /// line status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineStatus: u8 {
        /// a byte is waiting in the receive buffer
        const DATA_READY = 1 << 0;
        /// receive overrun
        const OVERRUN = 1 << 1;
        /// parity error
        const PARITY_ERROR = 1 << 2;
        /// framing error
        const FRAMING_ERROR = 1 << 3;
        /// break received
        const BREAK = 1 << 4;
        /// transmit holding register empty
        const THR_EMPTY = 1 << 5;
        /// transmitter completely idle
        const TRANSMITTER_EMPTY = 1 << 6;
    }
}

/// Errors reported by the serial driver, each with its own negative code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    /// baud rate not positive or outside the divisor range
    InvalidBaudRate,
    /// close on a device that is not open
    AlreadyClosed,
    /// request against a closed device
    DeviceNotOpen,
    /// empty buffer
    InvalidArgument,
    /// another operation is in progress
    DeviceBusy,
    /// write longer than the driver accepts
    InvalidLength,
    /// port number is not a known serial line
    UnknownDevice,
    /// the line was never initialised
    NotInitialized,
    /// no memory for the ring buffer
    AllocationFailure,
    /// every device control block is in use
    NoFreeSlot,
}

impl SerialError {
    /// the status code returned through the system-call surface
    pub fn as_errno(self) -> isize {
        match self {
            SerialError::InvalidBaudRate => -102,
            SerialError::AlreadyClosed => -201,
            SerialError::DeviceNotOpen => -301,
            SerialError::InvalidArgument => -302,
            SerialError::DeviceBusy => -303,
            SerialError::InvalidLength => -403,
            SerialError::UnknownDevice => -501,
            SerialError::NotInitialized => -502,
            SerialError::AllocationFailure => -601,
            SerialError::NoFreeSlot => -602,
        }
    }
}

impl Display for SerialError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.as_errno())
    }
}

/// The four PC serial lines, identified by their base port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum Device {
    /// first serial line
    Com1 = 0x3F8,
    /// second serial line
    Com2 = 0x2F8,
    /// third serial line
    Com3 = 0x3E8,
    /// fourth serial line
    Com4 = 0x2E8,
}

impl Device {
    /// every serial line, in device-number order
    pub const ALL: [Device; MAX_DEVICES] = [Device::Com1, Device::Com2, Device::Com3, Device::Com4];

    /// base I/O port
    pub fn base(self) -> u16 {
        self as u16
    }

    /// device number, 0 to 3
    pub fn index(self) -> usize {
        match self {
            Device::Com1 => 0,
            Device::Com2 => 1,
            Device::Com3 => 2,
            Device::Com4 => 3,
        }
    }

    /// IRQ line the device raises
    pub fn irq(self) -> u8 {
        match self {
            Device::Com1 | Device::Com3 => 4,
            Device::Com2 | Device::Com4 => 3,
        }
    }

    /// port of register `offset`
    pub fn port(self, offset: u16) -> u16 {
        self.base() + offset
    }
}

impl TryFrom<u16> for Device {
    type Error = SerialError;

    fn try_from(port: u16) -> Result<Self, Self::Error> {
        Device::ALL
            .into_iter()
            .find(|dev| dev.base() == port)
            .ok_or(SerialError::UnknownDevice)
    }
}

/// the cause reported in the interrupt identification register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptCause {
    /// modem status changed
    ModemStatus,
    /// transmit holding register empty
    TransmitEmpty,
    /// received data available
    DataReady,
    /// receiver line status
    LineStatus,
    /// bytes sat in the receive FIFO without reaching the trigger level
    CharacterTimeout,
}

impl InterruptCause {
    /// decode an IIR value, `None` when no interrupt is pending
    pub fn decode(iir: u8) -> Option<Self> {
        if iir.get_bit(0) {
            return None;
        }
        match iir.get_bits(1..4) {
            0b000 => Some(InterruptCause::ModemStatus),
            0b001 => Some(InterruptCause::TransmitEmpty),
            0b010 => Some(InterruptCause::DataReady),
            0b011 => Some(InterruptCause::LineStatus),
            0b110 => Some(InterruptCause::CharacterTimeout),
            _ => None,
        }
    }

    /// the IIR value reporting this cause, FIFO bits clear
    pub fn code(self) -> u8 {
        let id: u8 = match self {
            InterruptCause::ModemStatus => 0b000,
            InterruptCause::TransmitEmpty => 0b001,
            InterruptCause::DataReady => 0b010,
            InterruptCause::LineStatus => 0b011,
            InterruptCause::CharacterTimeout => 0b110,
        };
        id << 1
    }
}

/// Compute the divisor latch value for `baud_rate`.
pub fn divisor(baud_rate: i32) -> Result<u16, SerialError> {
    if baud_rate <= 0 {
        return Err(SerialError::InvalidBaudRate);
    }
    let div = UART_CLOCK / baud_rate as u32;
    u16::try_from(div)
        .ok()
        .filter(|&div| div != 0)
        .ok_or(SerialError::InvalidBaudRate)
}

/// Program the divisor latch, leaving the line in 8-N-1.
pub fn set_divisor<P: PortIo>(ports: &mut P, dev: Device, div: u16) {
    ports.outb(dev.port(reg::LCR), LineControl::DLAB.bits());
    ports.outb(dev.port(reg::DLL), div.get_bits(0..8) as u8);
    ports.outb(dev.port(reg::DLM), div.get_bits(8..16) as u8);
    ports.outb(dev.port(reg::LCR), LineControl::DATA_8.bits());
}

const ESC: u8 = 0x1B;
const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7F;
const CURSOR_LEFT: &[u8] = b"\x1b[D";
const CURSOR_RIGHT: &[u8] = b"\x1b[C";
const CLEAR_LINE: &[u8] = b"\x1b[K";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    Started,
    Csi,
}

/// Polled access to the serial lines: initialisation, raw output and console line input.
#[derive(Debug, Default)]
pub struct Uart {
    initialized: [bool; MAX_DEVICES],
}

impl Uart {
    /// no line initialised yet
    pub const fn new() -> Self {
        Uart {
            initialized: [false; MAX_DEVICES],
        }
    }

    /// true once `init` ran for `dev`
    pub fn is_initialized(&self, dev: Device) -> bool {
        self.initialized[dev.index()]
    }

    fn check(&self, dev: Device) -> Result<(), SerialError> {
        if self.is_initialized(dev) {
            Ok(())
        } else {
            Err(SerialError::NotInitialized)
        }
    }

    /// Program `dev` for the default baud rate, 8-N-1, FIFOs on and the IRQ line gated through.
    pub fn init<P: PortIo>(&mut self, ports: &mut P, dev: Device) {
        trace!("initialising {:?}", dev);
        ports.outb(dev.port(reg::IER), 0x00);
        set_divisor(ports, dev, (UART_CLOCK / DEFAULT_BAUD) as u16);
        let fifo = FifoControl::ENABLE
            | FifoControl::CLEAR_RX
            | FifoControl::CLEAR_TX
            | FifoControl::TRIGGER_14;
        ports.outb(dev.port(reg::FCR), fifo.bits());
        let modem = ModemControl::DTR | ModemControl::RTS | ModemControl::OUT2;
        ports.outb(dev.port(reg::MCR), modem.bits());
        let _ = ports.inb(dev.port(reg::RBR));
        self.initialized[dev.index()] = true;
    }

    /// Write `bytes` straight to the transmit register.
    pub fn out<P: PortIo>(
        &self,
        ports: &mut P,
        dev: Device,
        bytes: &[u8],
    ) -> Result<usize, SerialError> {
        self.check(dev)?;
        for &byte in bytes {
            ports.outb(dev.port(reg::THR), byte);
        }
        Ok(bytes.len())
    }

    /// Read a line from `dev`, busy-waiting for every byte.
    ///
    /// Printable input is echoed, backspace/delete and the arrow keys edit the line, and a
    /// newline or carriage return ends it. At most `buf.len() - 1` bytes are stored and the
    /// result is always NUL terminated. Returns the line length.
    pub fn poll<P: PortIo>(
        &self,
        ports: &mut P,
        dev: Device,
        buf: &mut [u8],
    ) -> Result<usize, SerialError> {
        if buf.is_empty() {
            return Err(SerialError::InvalidArgument);
        }
        self.check(dev)?;

        let mut len = 0;
        let mut cursor = 0;
        let mut escape = Escape::None;

        while len < buf.len() - 1 {
            let c = read_byte(ports, dev);

            match escape {
                Escape::Started => {
                    escape = if c == b'[' { Escape::Csi } else { Escape::None };
                    continue;
                }
                Escape::Csi => {
                    escape = Escape::None;
                    match c {
                        b'D' if cursor > 0 => {
                            cursor -= 1;
                            self.out(ports, dev, CURSOR_LEFT)?;
                        }
                        b'C' if cursor < len => {
                            cursor += 1;
                            self.out(ports, dev, CURSOR_RIGHT)?;
                        }
                        b'3' => {
                            if read_byte(ports, dev) == b'~' && cursor < len {
                                buf.copy_within(cursor + 1..len, cursor);
                                len -= 1;
                                buf[len] = 0;
                                self.out(ports, dev, CLEAR_LINE)?;
                                self.redraw(ports, dev, &buf[cursor..len])?;
                            }
                        }
                        _ => {}
                    }
                    continue;
                }
                Escape::None => {}
            }

            match c {
                ESC => escape = Escape::Started,
                BACKSPACE | DELETE => {
                    if cursor > 0 {
                        buf.copy_within(cursor..len, cursor - 1);
                        cursor -= 1;
                        len -= 1;
                        buf[len] = 0;
                        self.out(ports, dev, CURSOR_LEFT)?;
                        self.out(ports, dev, CLEAR_LINE)?;
                        self.redraw(ports, dev, &buf[cursor..len])?;
                    }
                }
                b'\n' | b'\r' => {
                    buf[len] = c;
                    len += 1;
                    self.out(ports, dev, &[c])?;
                    break;
                }
                c if c.is_ascii_graphic() || c == b' ' => {
                    buf.copy_within(cursor..len, cursor + 1);
                    buf[cursor] = c;
                    len += 1;
                    cursor += 1;
                    self.out(ports, dev, &buf[cursor - 1..cursor])?;
                    self.redraw(ports, dev, &buf[cursor..len])?;
                }
                _ => {}
            }
        }

        buf[len] = 0;
        debug!("polled {} bytes from {:?}", len, dev);
        Ok(len)
    }

    /// print the tail of the line and walk the cursor back to where it was
    fn redraw<P: PortIo>(
        &self,
        ports: &mut P,
        dev: Device,
        tail: &[u8],
    ) -> Result<(), SerialError> {
        self.out(ports, dev, tail)?;
        for _ in 0..tail.len() {
            self.out(ports, dev, CURSOR_LEFT)?;
        }
        Ok(())
    }
}

fn read_byte<P: PortIo>(ports: &mut P, dev: Device) -> u8 {
    while !LineStatus::from_bits_truncate(ports.inb(dev.port(reg::LSR)))
        .contains(LineStatus::DATA_READY)
    {
        core::hint::spin_loop();
    }
    ports.inb(dev.port(reg::RBR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::sim::SimPlatform;
    use alloc::{vec, vec::Vec};

    fn ready(sim: &mut SimPlatform, dev: Device) -> Uart {
        let mut uart = Uart::new();
        uart.init(sim, dev);
        sim.clear_transmitted(dev);
        uart
    }

    fn poll_line(input: &[u8], size: usize) -> (Vec<u8>, usize, SimPlatform) {
        let mut sim = SimPlatform::new();
        let uart = ready(&mut sim, Device::Com1);
        sim.feed(Device::Com1, input);
        let mut buf = vec![0xFFu8; size];
        let n = uart.poll(&mut sim, Device::Com1, &mut buf).unwrap();
        (buf, n, sim)
    }


    #[test]
    fn device_mapping() {
        assert_eq!(Device::try_from(0x3F8), Ok(Device::Com1));
        assert_eq!(Device::try_from(0x2E8), Ok(Device::Com4));
        assert_eq!(Device::try_from(0x1234), Err(SerialError::UnknownDevice));
        assert_eq!(Device::Com3.index(), 2);
        assert_eq!(Device::Com2.irq(), 3);
    }

    #[test]
    fn divisor_bounds() {
        assert_eq!(divisor(9600), Ok(12));
        assert_eq!(divisor(115_200), Ok(1));
        assert_eq!(divisor(0), Err(SerialError::InvalidBaudRate));
        assert_eq!(divisor(-9600), Err(SerialError::InvalidBaudRate));
        assert_eq!(divisor(230_400), Err(SerialError::InvalidBaudRate));
        assert_eq!(divisor(1), Err(SerialError::InvalidBaudRate));
    }

    #[test]
    fn interrupt_causes() {
        assert_eq!(InterruptCause::decode(0xC1), None);
        assert_eq!(InterruptCause::decode(0xC2), Some(InterruptCause::TransmitEmpty));
        assert_eq!(InterruptCause::decode(0xC4), Some(InterruptCause::DataReady));
        assert_eq!(InterruptCause::decode(0xCC), Some(InterruptCause::CharacterTimeout));
        for cause in [
            InterruptCause::TransmitEmpty,
            InterruptCause::DataReady,
            InterruptCause::LineStatus,
        ] {
            assert_eq!(InterruptCause::decode(cause.code()), Some(cause));
        }
    }

    #[test]
    fn init_programs_registers_in_order() {
        let mut sim = SimPlatform::new();
        let mut uart = Uart::new();
        assert!(!uart.is_initialized(Device::Com2));
        uart.init(&mut sim, Device::Com2);
        let base = Device::Com2.base();
        assert_eq!(
            sim.writes(),
            &[
                (base + reg::IER, 0x00),
                (base + reg::LCR, 0x80),
                (base + reg::DLL, 12),
                (base + reg::DLM, 0x00),
                (base + reg::LCR, 0x03),
                (base + reg::FCR, 0xC7),
                (base + reg::MCR, 0x0B),
            ]
        );
        assert!(uart.is_initialized(Device::Com2));
        assert!(sim.transmitted(Device::Com2).is_empty());
    }

    #[test]
    fn out_requires_init() {
        let mut sim = SimPlatform::new();
        let uart = ready(&mut sim, Device::Com1);
        assert_eq!(uart.out(&mut sim, Device::Com3, b"x"), Err(SerialError::NotInitialized));
        assert_eq!(uart.out(&mut sim, Device::Com1, b"hey"), Ok(3));
        assert_eq!(sim.transmitted(Device::Com1), b"hey");
    }

    #[test]
    fn poll_echoes_and_terminates_on_newline() {
        let (buf, n, sim) = poll_line(b"hi there\rignored", 32);
        assert_eq!(n, 9);
        assert_eq!(&buf[..10], b"hi there\r\0");
        assert_eq!(sim.transmitted(Device::Com1), b"hi there\r");
    }

    #[test]
    fn poll_backspace_removes_previous_byte() {
        let (buf, n, _) = poll_line(b"ab\x7fc\x08d\n", 32);
        assert_eq!(n, 3);
        assert_eq!(&buf[..4], b"ad\n\0");
    }

    #[test]
    fn poll_cursor_keys_insert_mid_line() {
        let (buf, n, _) = poll_line(b"ac\x1b[Db\x1b[C!\n", 32);
        assert_eq!(n, 5);
        assert_eq!(&buf[..6], b"abc!\n\0");
    }

    #[test]
    fn poll_delete_key_removes_under_cursor() {
        let (buf, n, _) = poll_line(b"abc\x1b[D\x1b[D\x1b[3~\n", 32);
        assert_eq!(n, 3);
        assert_eq!(&buf[..4], b"ac\n\0");
    }

    #[test]
    fn poll_stops_one_short_of_the_buffer() {
        let (buf, n, _) = poll_line(b"abcdefgh", 5);
        assert_eq!(n, 4);
        assert_eq!(&buf, b"abcd\0");
    }

    #[test]
    fn poll_rejects_empty_buffer() {
        let mut sim = SimPlatform::new();
        let uart = ready(&mut sim, Device::Com1);
        assert_eq!(uart.poll(&mut sim, Device::Com1, &mut []), Err(SerialError::InvalidArgument));
        let mut buf = [0u8; 4];
        assert_eq!(uart.poll(&mut sim, Device::Com2, &mut buf), Err(SerialError::NotInitialized));
    }
}
