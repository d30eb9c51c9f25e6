use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use rtu_master::modbus::encode_frame;
use rtu_master::modbus::ExceptionCode;
use rtu_master::transport::{LineSettings, PortHandle};
use rtu_master::{
    CodecError, MasterConfig, ModbusError, ModbusRequest, ModbusResponse, ModbusRtuMaster, RawPduCodec,
    SerialSession, SerialTransport, StandardCodec, TransportError,
};

/// What the simulated device does after a frame is written.
#[derive(Clone)]
enum Reply {
    Frame(Vec<u8>),
    /// Sends the request frame straight back.
    Echo,
    Silent,
}

#[derive(Default)]
struct BusState {
    open: bool,
    opens: u32,
    closes: u32,
    written: Vec<Vec<u8>>,
    replies: VecDeque<Reply>,
    fail_configure: bool,
    fail_write: bool,
    fail_read: bool,
}

#[derive(Clone, Default)]
struct MockTransport {
    state: Rc<RefCell<BusState>>,
    known_ports: Vec<String>,
}

impl MockTransport {
    fn with_port(name: &str) -> Self {
        Self {
            state: Rc::default(),
            known_ports: vec![name.to_string()],
        }
    }

    fn push(&self, reply: Reply) {
        self.state.borrow_mut().replies.push_back(reply);
    }
}

struct MockSession {
    state: Rc<RefCell<BusState>>,
    pending: Vec<u8>,
}

impl SerialTransport for MockTransport {
    type Session = MockSession;

    fn identify(&self, port_name: &str) -> Result<PortHandle, TransportError> {
        if self.known_ports.iter().any(|p| p == port_name) {
            Ok(PortHandle::new(port_name))
        } else {
            Err(TransportError::NotFound(port_name.to_string()))
        }
    }

    fn open(&self, handle: &PortHandle, _timeout: Duration) -> Result<MockSession, TransportError> {
        let mut state = self.state.borrow_mut();
        if state.open {
            return Err(TransportError::AlreadyOwned(handle.name.clone()));
        }
        state.open = true;
        state.opens += 1;
        Ok(MockSession {
            state: self.state.clone(),
            pending: Vec::new(),
        })
    }
}

impl SerialSession for MockSession {
    fn configure(&mut self, _settings: &LineSettings) -> Result<(), TransportError> {
        if self.state.borrow().fail_configure {
            return Err(TransportError::ConfigFailed("unsupported baud rate".to_string()));
        }
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if state.fail_write {
            return Err(TransportError::WriteFailed("device disconnected".to_string()));
        }
        state.written.push(bytes.to_vec());
        self.pending = match state.replies.pop_front().unwrap_or(Reply::Silent) {
            Reply::Frame(frame) => frame,
            Reply::Echo => bytes.to_vec(),
            Reply::Silent => Vec::new(),
        };
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        if self.state.borrow().fail_read {
            return Err(TransportError::ReadFailed("framing error".to_string()));
        }
        if self.pending.is_empty() {
            std::thread::sleep(timeout);
            return Ok(0);
        }
        // Deliver in small chunks like a real UART
        let n = self.pending.len().min(buf.len()).min(3);
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.open = false;
        state.closes += 1;
    }
}

const PORT: &str = "/dev/ttyMOCK0";

fn config() -> MasterConfig {
    MasterConfig {
        serial_port: PORT.to_string(),
        timeout_ms: 50,
        ..MasterConfig::default()
    }
}

fn reply_frame(slave: u8, pdu: &[u8]) -> Vec<u8> {
    encode_frame(&RawPduCodec, slave, &pdu.to_vec()).unwrap()
}

fn master(transport: &MockTransport) -> ModbusRtuMaster<MockTransport, StandardCodec> {
    ModbusRtuMaster::with_transport(config(), transport.clone(), StandardCodec)
}

fn assert_released(transport: &MockTransport, opens: u32) {
    let state = transport.state.borrow();
    assert!(!state.open, "port left open");
    assert_eq!(state.opens, opens);
    assert_eq!(state.closes, opens);
}

#[test]
fn read_holding_registers_exchange() {
    let transport = MockTransport::with_port(PORT);
    transport.push(Reply::Frame(reply_frame(1, &[0x03, 0x04, 0x00, 0x0A, 0x01, 0x02])));

    let values = master(&transport).read_holding_registers(1, 0, 2).unwrap();
    assert_eq!(values, vec![10, 258]);

    let state = transport.state.borrow();
    assert_eq!(state.written, vec![vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B]]);
    drop(state);
    assert_released(&transport, 1);
}

#[test]
fn read_timeout_releases_port_for_next_exchange() {
    let transport = MockTransport::with_port(PORT);
    let mut master = master(&transport);

    transport.push(Reply::Silent);
    let err = master.read_coils(1, 0, 8).unwrap_err();
    assert!(matches!(err, ModbusError::ReadTimeout { expected: 6, received: 0 }));
    assert_released(&transport, 1);

    // the same port opens again straight away
    transport.push(Reply::Frame(reply_frame(1, &[0x01, 0x01, 0x81])));
    let bits = master.read_coils(1, 0, 8).unwrap();
    assert_eq!(bits, vec![true, false, false, false, false, false, false, true]);
    assert_released(&transport, 2);
}

#[test]
fn truncated_reply_is_a_timeout() {
    let transport = MockTransport::with_port(PORT);
    let full = reply_frame(1, &[0x03, 0x04, 0x00, 0x0A, 0x01, 0x02]);
    transport.push(Reply::Frame(full[..5].to_vec()));

    let err = master(&transport).read_holding_registers(1, 0, 2).unwrap_err();
    assert!(matches!(err, ModbusError::ReadTimeout { expected: 9, received: 5 }));
    assert_released(&transport, 1);
}

#[test]
fn unknown_port_is_unavailable() {
    let transport = MockTransport::with_port("/dev/ttyOTHER");
    let err = master(&transport).write_single_coil(1, 0, true).unwrap_err();
    assert!(matches!(err, ModbusError::PortUnavailable { ref port, .. } if port == PORT));
    assert_eq!(transport.state.borrow().opens, 0);
}

#[test]
fn configuration_failure_closes_port() {
    let transport = MockTransport::with_port(PORT);
    transport.state.borrow_mut().fail_configure = true;

    let err = master(&transport).read_coils(1, 0, 1).unwrap_err();
    assert!(matches!(err, ModbusError::PortConfigurationFailed(_)));
    assert_released(&transport, 1);
}

#[test]
fn write_failure_closes_port() {
    let transport = MockTransport::with_port(PORT);
    transport.state.borrow_mut().fail_write = true;

    let err = master(&transport).write_single_register(1, 1, 3).unwrap_err();
    assert!(matches!(err, ModbusError::WriteFailed(_)));
    assert!(err.is_transport_error());
    assert_released(&transport, 1);
}

#[test]
fn read_failure_closes_port() {
    let transport = MockTransport::with_port(PORT);
    transport.state.borrow_mut().fail_read = true;
    transport.push(Reply::Frame(reply_frame(1, &[0x03, 0x02, 0x00, 0x01])));

    let err = master(&transport).read_holding_registers(1, 0, 1).unwrap_err();
    assert!(matches!(err, ModbusError::ReadFailed(ref reason) if reason.contains("framing error")));
    assert!(err.is_transport_error());
    assert_released(&transport, 1);
}

#[test]
fn port_held_elsewhere_is_unavailable() {
    let transport = MockTransport::with_port(PORT);
    let mut held = transport.open(&PortHandle::new(PORT), Duration::from_millis(10)).unwrap();

    let err = master(&transport).read_coils(1, 0, 1).unwrap_err();
    assert!(matches!(err, ModbusError::PortUnavailable { ref port, .. } if port == PORT));
    assert_eq!(transport.state.borrow().opens, 1);
    assert!(transport.state.borrow().written.is_empty());

    // once released, the next exchange gets the port
    held.close();
    transport.push(Reply::Frame(reply_frame(1, &[0x01, 0x01, 0x01])));
    assert_eq!(master(&transport).read_coils(1, 0, 1).unwrap(), vec![true]);
    assert_released(&transport, 2);
}

#[test]
fn corrupted_reply_is_crc_mismatch() {
    let transport = MockTransport::with_port(PORT);
    let mut frame = reply_frame(1, &[0x03, 0x02, 0x12, 0x34]);
    frame[3] ^= 0x10;
    transport.push(Reply::Frame(frame));

    let err = master(&transport).read_holding_registers(1, 0, 1).unwrap_err();
    assert!(matches!(err, ModbusError::CrcMismatch { .. }));
    assert_released(&transport, 1);
}

#[test]
fn exception_reply_is_decode_error() {
    let transport = MockTransport::with_port(PORT);
    transport.push(Reply::Frame(reply_frame(1, &[0x83, 0x02])));

    let err = master(&transport).read_holding_registers(1, 0x1000, 10).unwrap_err();
    match err {
        ModbusError::PduDecodeError(CodecError::Exception { code, .. }) => {
            assert_eq!(code, ExceptionCode::IllegalDataAddress)
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_released(&transport, 1);
}

#[test]
fn reply_from_other_slave() {
    let transport = MockTransport::with_port(PORT);
    transport.push(Reply::Frame(reply_frame(9, &[0x06, 0x00, 0x01, 0x00, 0x03])));

    let err = master(&transport).write_single_register(1, 1, 3).unwrap_err();
    assert!(matches!(err, ModbusError::UnexpectedSlaveAddress { expected: 1, received: 9 }));

    let lenient = MasterConfig { verify_slave_address: false, ..config() };
    let mut master = ModbusRtuMaster::with_transport(lenient, transport.clone(), StandardCodec);
    transport.push(Reply::Frame(reply_frame(9, &[0x06, 0x00, 0x01, 0x00, 0x03])));
    assert!(master.write_single_register(1, 1, 3).is_ok());
    assert_released(&transport, 2);
}

#[test]
fn invalid_request_never_opens_port() {
    let transport = MockTransport::with_port(PORT);
    let err = master(&transport).read_holding_registers(1, 0, 200).unwrap_err();
    assert!(matches!(err, ModbusError::InvalidRequest(CodecError::QuantityOutOfRange { .. })));
    assert_eq!(transport.state.borrow().opens, 0);
}

#[test]
fn write_single_coil_echo() {
    let transport = MockTransport::with_port(PORT);
    transport.push(Reply::Echo);
    master(&transport).write_single_coil(0x11, 0x00AC, true).unwrap();

    let state = transport.state.borrow();
    assert_eq!(state.written[0], vec![0x11, 0x05, 0x00, 0xAC, 0xFF, 0x00, 0x4E, 0x8B]);
}

#[test]
fn write_single_coil_bad_echo() {
    let transport = MockTransport::with_port(PORT);
    transport.push(Reply::Frame(reply_frame(1, &[0x05, 0x00, 0x01, 0x00, 0x00])));

    let err = master(&transport).write_single_coil(1, 1, true).unwrap_err();
    assert!(matches!(err, ModbusError::PduDecodeError(CodecError::EchoMismatch(_))));
}

#[test]
fn write_multiple_coils_seventeen() {
    let transport = MockTransport::with_port(PORT);
    transport.push(Reply::Frame(reply_frame(1, &[0x0F, 0x00, 0x05, 0x00, 0x11])));

    master(&transport).write_multiple_coils(1, 5, &[true; 17]).unwrap();

    let state = transport.state.borrow();
    let frame = &state.written[0];
    assert_eq!(frame.len(), 12);
    assert_eq!(frame[6], 3);
}

#[test]
fn raw_codec_round_trip_through_master() {
    let transport = MockTransport::with_port(PORT);
    transport.push(Reply::Echo);

    let pdu = vec![0x2B, 0x0E, 0x01, 0x00];
    let mut master = ModbusRtuMaster::with_transport(config(), transport.clone(), RawPduCodec);
    assert_eq!(master.send_request(&pdu, 3).unwrap(), pdu);
    assert_released(&transport, 1);
}

#[test]
fn send_request_returns_decoded_response() {
    let transport = MockTransport::with_port(PORT);
    transport.push(Reply::Frame(reply_frame(1, &[0x02, 0x01, 0x03])));

    let response = master(&transport)
        .send_request(&ModbusRequest::ReadDiscreteInputs { address: 0, quantity: 2 }, 1)
        .unwrap();
    match response {
        ModbusResponse::ReadDiscreteInputs(bits) => assert_eq!(&bits[..2], &[true, true]),
        other => panic!("unexpected response {:?}", other),
    }
}
