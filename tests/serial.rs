use std::sync::Arc;

use fijinix::{
    Device, InterruptHandler, Operation, PortStatus, SerialError, SerialIo, SimPlatform,
    internal::{memory::leaked_heap, uart::InterruptCause},
};
use linked_list_allocator::LockedHeap;

type Driver = SerialIo<SimPlatform, Arc<LockedHeap>>;

fn driver() -> Driver {
    SerialIo::new(SimPlatform::new(), leaked_heap(16 * 1024))
}

fn type_in(io: &mut Driver, dev: Device, text: &[u8]) {
    for &byte in text {
        io.platform_mut().receive(dev, byte);
        io.handle_interrupt(dev.irq());
    }
}

#[test]
fn echo_session_over_two_lines() {
    let mut io = driver();
    io.open(Device::Com1, 9600).unwrap();
    io.open(Device::Com2, 38400).unwrap();
    assert_eq!(io.status(Device::Com3), PortStatus::Closed);

    type_in(&mut io, Device::Com2, b"ping\r\n");
    let mut line = [0u8; 16];
    let n = io.read(Device::Com2, &mut line, None).unwrap();
    assert_eq!(&line[..n], b"ping\r\n");
    assert!(io.take_completion(Device::Com2).is_some());

    io.write(Device::Com1, &line[..4], None).unwrap();
    while io.dcb(Device::Com1).unwrap().operation() == Operation::Write {
        io.platform_mut().raise(Device::Com1, InterruptCause::TransmitEmpty);
        io.handle_interrupt(Device::Com1.irq());
    }
    assert!(io.platform().transmitted(Device::Com1).ends_with(b"ping"));
    assert!(io.take_event(Device::Com1));

    io.close(Device::Com1).unwrap();
    io.close(Device::Com2).unwrap();
    assert_eq!(io.close(Device::Com2), Err(SerialError::AlreadyClosed));
}

#[test]
fn pending_read_finishes_on_next_byte() {
    let mut io = driver();
    io.open(Device::Com4, 9600).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(io.read(Device::Com4, &mut buf, None), Ok(0));
    assert_eq!(io.dcb(Device::Com4).unwrap().operation(), Operation::Read);

    type_in(&mut io, Device::Com4, b"\rq");
    let done = io.take_completion(Device::Com4).unwrap();
    assert_eq!(done.device, Device::Com4);
    assert_eq!(done.request.unwrap().data, b"q");
}

#[test]
fn all_four_lines_fit_and_a_reopen_keeps_the_slot() {
    let mut io = driver();
    for dev in Device::ALL {
        io.open(dev, 9600).unwrap();
    }
    type_in(&mut io, Device::Com3, b"kept");
    io.open(Device::Com3, 1200).unwrap();
    assert_eq!(io.dcb(Device::Com3).unwrap().buffered(), 4);
    for dev in Device::ALL {
        assert_eq!(io.status(dev), PortStatus::Open);
    }
}
