use log::{debug, error, info};

use super::codec::{CodecError, PduCodec, StandardCodec};
use super::frame::{decode_frame, encode_frame};
use super::function_code::FunctionCode;
use super::protocol::{ModbusRequest, ModbusResponse, SlaveId};
use crate::config::MasterConfig;
use crate::transport::{
    read_reply, ReplyLength, SerialPortTransport, SerialSession, SerialTransport, SessionGuard,
};
use crate::utils::error::{ModbusError, ModbusResult};

/// Modbus RTU master. Each call to `send_request` is one complete exchange:
/// the port is opened, used, and closed again before it returns.
pub struct ModbusRtuMaster<T: SerialTransport, C: PduCodec = StandardCodec> {
    config: MasterConfig,
    transport: T,
    codec: C,
}

impl ModbusRtuMaster<SerialPortTransport, StandardCodec> {
    pub fn new(config: MasterConfig) -> Self {
        Self::with_transport(config, SerialPortTransport, StandardCodec)
    }
}

impl<T: SerialTransport, C: PduCodec> ModbusRtuMaster<T, C> {
    pub fn with_transport(config: MasterConfig, transport: T, codec: C) -> Self {
        Self { config, transport, codec }
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    pub fn send_request(&mut self, request: &C::Request, slave_id: SlaveId) -> ModbusResult<C::Response> {
        let result = self.exchange(request, slave_id);
        if let Err(e) = &result {
            error!("❌ Exchange with slave {} failed: {}", slave_id, e);
        }
        result
    }

    fn exchange(&self, request: &C::Request, slave_id: SlaveId) -> ModbusResult<C::Response> {
        let function = self.codec.function_code(request);
        // Malformed requests are rejected here, before the port is touched.
        let frame = encode_frame(&self.codec, slave_id, request)?;

        let mut session = self.acquire()?;
        debug!("State: TransportAcquired ({})", self.config.serial_port);

        session.write_all(&frame)?;
        debug!("📤 Sent {} to slave {}: {}", function, slave_id, hex::encode_upper(&frame));

        let length = ReplyLength::for_pdu(self.codec.reply_pdu_len(request));
        let silence = self.config.line_settings().inter_frame_silence();
        let reply = read_reply(&mut *session, length, self.config.timeout(), silence)?;
        debug!("📥 Received from slave {}: {}", slave_id, hex::encode_upper(&reply));

        drop(session);

        decode_frame(&self.codec, slave_id, function, &reply, self.config.verify_slave_address)
    }

    fn acquire(&self) -> ModbusResult<SessionGuard<T::Session>> {
        let handle = self.transport.identify(&self.config.serial_port)?;
        let session = self.transport.open(&handle, self.config.timeout())?;

        // From here on the guard closes the port on every exit path.
        let mut session = SessionGuard::new(session, &handle.name);
        session.configure(&self.config.line_settings())?;

        info!("✅ Serial port {} ready", handle.name);
        Ok(session)
    }
}

impl<T: SerialTransport> ModbusRtuMaster<T, StandardCodec> {
    pub fn read_coils(&mut self, slave_id: SlaveId, address: u16, quantity: u16) -> ModbusResult<Vec<bool>> {
        match self.send_request(&ModbusRequest::ReadCoils { address, quantity }, slave_id)? {
            ModbusResponse::ReadCoils(bits) => take_bits(bits, quantity),
            other => Err(unexpected(FunctionCode::ReadCoils, &other)),
        }
    }

    pub fn read_discrete_inputs(
        &mut self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<bool>> {
        match self.send_request(&ModbusRequest::ReadDiscreteInputs { address, quantity }, slave_id)? {
            ModbusResponse::ReadDiscreteInputs(bits) => take_bits(bits, quantity),
            other => Err(unexpected(FunctionCode::ReadDiscreteInputs, &other)),
        }
    }

    pub fn read_holding_registers(
        &mut self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        info!("📊 Reading {} registers from device {} starting at address {}", quantity, slave_id, address);
        match self.send_request(&ModbusRequest::ReadHoldingRegisters { address, quantity }, slave_id)? {
            ModbusResponse::ReadHoldingRegisters(values) => check_registers(values, quantity),
            other => Err(unexpected(FunctionCode::ReadHoldingRegisters, &other)),
        }
    }

    pub fn read_input_registers(
        &mut self,
        slave_id: SlaveId,
        address: u16,
        quantity: u16,
    ) -> ModbusResult<Vec<u16>> {
        match self.send_request(&ModbusRequest::ReadInputRegisters { address, quantity }, slave_id)? {
            ModbusResponse::ReadInputRegisters(values) => check_registers(values, quantity),
            other => Err(unexpected(FunctionCode::ReadInputRegisters, &other)),
        }
    }

    pub fn write_single_coil(&mut self, slave_id: SlaveId, address: u16, value: bool) -> ModbusResult<()> {
        let request = ModbusRequest::WriteSingleCoil { address, value };
        let expected = ModbusResponse::WriteSingleCoil { address, value };
        let response = self.send_request(&request, slave_id)?;
        check_echo(&expected, &response)
    }

    pub fn write_single_register(&mut self, slave_id: SlaveId, address: u16, value: u16) -> ModbusResult<()> {
        let request = ModbusRequest::WriteSingleRegister { address, value };
        let expected = ModbusResponse::WriteSingleRegister { address, value };
        let response = self.send_request(&request, slave_id)?;
        check_echo(&expected, &response)
    }

    pub fn write_multiple_coils(&mut self, slave_id: SlaveId, address: u16, values: &[bool]) -> ModbusResult<()> {
        let request = ModbusRequest::WriteMultipleCoils { address, values: values.to_vec() };
        let expected = ModbusResponse::WriteMultipleCoils { address, quantity: values.len() as u16 };
        let response = self.send_request(&request, slave_id)?;
        check_echo(&expected, &response)
    }

    pub fn write_multiple_registers(
        &mut self,
        slave_id: SlaveId,
        address: u16,
        values: &[u16],
    ) -> ModbusResult<()> {
        let request = ModbusRequest::WriteMultipleRegisters { address, values: values.to_vec() };
        let expected = ModbusResponse::WriteMultipleRegisters { address, quantity: values.len() as u16 };
        let response = self.send_request(&request, slave_id)?;
        check_echo(&expected, &response)
    }
}

fn take_bits(mut bits: Vec<bool>, quantity: u16) -> ModbusResult<Vec<bool>> {
    let quantity = quantity as usize;
    if bits.len() < quantity {
        return Err(CodecError::ByteCountMismatch {
            declared: (quantity + 7) / 8,
            actual: bits.len() / 8,
        }
        .into());
    }
    bits.truncate(quantity);
    Ok(bits)
}

fn check_registers(values: Vec<u16>, quantity: u16) -> ModbusResult<Vec<u16>> {
    if values.len() != quantity as usize {
        return Err(CodecError::ByteCountMismatch {
            declared: quantity as usize * 2,
            actual: values.len() * 2,
        }
        .into());
    }
    Ok(values)
}

fn check_echo(expected: &ModbusResponse, response: &ModbusResponse) -> ModbusResult<()> {
    if expected == response {
        Ok(())
    } else {
        Err(CodecError::EchoMismatch(format!("expected {:?}, got {:?}", expected, response)).into())
    }
}

fn unexpected(function: FunctionCode, response: &ModbusResponse) -> ModbusError {
    CodecError::FunctionMismatch {
        expected: function.as_u8(),
        received: response.function_code().as_u8(),
    }
    .into()
}
