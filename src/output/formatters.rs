use chrono::Utc;
use serde_json::{json, Value};

use crate::modbus::{ModbusResponse, SlaveId};

pub trait ResponseFormatter {
    fn format_response(&self, slave_id: SlaveId, response: &ModbusResponse) -> String;
    fn format_raw(&self, slave_id: SlaveId, pdu: &[u8]) -> String;
    fn format_ack(&self, slave_id: SlaveId, operation: &str) -> String;
}

/// Picks a formatter by name; unknown names fall back to the console one.
pub fn formatter_for(name: &str) -> Box<dyn ResponseFormatter> {
    match name {
        "json" => Box::new(JsonFormatter),
        "hex" => Box::new(HexFormatter),
        _ => Box::new(ConsoleFormatter),
    }
}

pub struct ConsoleFormatter;

impl ResponseFormatter for ConsoleFormatter {
    fn format_response(&self, slave_id: SlaveId, response: &ModbusResponse) -> String {
        let mut output = format!("🔹 Device {} - {}\n", slave_id, response.function_code());
        match response {
            ModbusResponse::ReadCoils(bits) | ModbusResponse::ReadDiscreteInputs(bits) => {
                for (i, bit) in bits.iter().enumerate() {
                    output.push_str(&format!("  [{}] {}\n", i, if *bit { "ON" } else { "OFF" }));
                }
            }
            ModbusResponse::ReadHoldingRegisters(values) | ModbusResponse::ReadInputRegisters(values) => {
                for (i, value) in values.iter().enumerate() {
                    output.push_str(&format!("  [{}] {} (0x{:04X})\n", i, value, value));
                }
            }
            ModbusResponse::WriteSingleCoil { address, value } => {
                output.push_str(&format!("  coil {} = {}\n", address, if *value { "ON" } else { "OFF" }));
            }
            ModbusResponse::WriteSingleRegister { address, value } => {
                output.push_str(&format!("  register {} = {}\n", address, value));
            }
            ModbusResponse::WriteMultipleCoils { address, quantity }
            | ModbusResponse::WriteMultipleRegisters { address, quantity } => {
                output.push_str(&format!("  {} items written at {}\n", quantity, address));
            }
        }
        output
    }

    fn format_raw(&self, slave_id: SlaveId, pdu: &[u8]) -> String {
        format!("🔹 Device {} raw PDU: {}", slave_id, hex::encode_upper(pdu))
    }

    fn format_ack(&self, slave_id: SlaveId, operation: &str) -> String {
        format!("✅ Device {}: {} acknowledged", slave_id, operation)
    }
}

pub struct JsonFormatter;

impl JsonFormatter {
    fn envelope(slave_id: SlaveId, data: Value) -> String {
        let json_data = json!({
            "slave_id": slave_id,
            "timestamp": Utc::now().to_rfc3339(),
            "data": data,
        });
        serde_json::to_string_pretty(&json_data).unwrap_or_default()
    }
}

impl ResponseFormatter for JsonFormatter {
    fn format_response(&self, slave_id: SlaveId, response: &ModbusResponse) -> String {
        let data = serde_json::to_value(response).unwrap_or(Value::Null);
        Self::envelope(slave_id, data)
    }

    fn format_raw(&self, slave_id: SlaveId, pdu: &[u8]) -> String {
        Self::envelope(slave_id, json!({ "pdu": hex::encode_upper(pdu) }))
    }

    fn format_ack(&self, slave_id: SlaveId, operation: &str) -> String {
        Self::envelope(slave_id, json!({ "acknowledged": operation }))
    }
}

/// Register values as hex words, bit values as packed bytes.
pub struct HexFormatter;

impl ResponseFormatter for HexFormatter {
    fn format_response(&self, _slave_id: SlaveId, response: &ModbusResponse) -> String {
        match response {
            ModbusResponse::ReadCoils(bits) | ModbusResponse::ReadDiscreteInputs(bits) => {
                hex::encode_upper(crate::modbus::codec::pack_bits(bits))
            }
            ModbusResponse::ReadHoldingRegisters(values) | ModbusResponse::ReadInputRegisters(values) => {
                values.iter().map(|v| format!("{:04X}", v)).collect::<Vec<_>>().join(" ")
            }
            ModbusResponse::WriteSingleCoil { address, value } => {
                format!("{:04X} {:04X}", address, if *value { 0xFF00u16 } else { 0 })
            }
            ModbusResponse::WriteSingleRegister { address, value: word }
            | ModbusResponse::WriteMultipleCoils { address, quantity: word }
            | ModbusResponse::WriteMultipleRegisters { address, quantity: word } => {
                format!("{:04X} {:04X}", address, word)
            }
        }
    }

    fn format_raw(&self, _slave_id: SlaveId, pdu: &[u8]) -> String {
        hex::encode_upper(pdu)
    }

    fn format_ack(&self, _slave_id: SlaveId, _operation: &str) -> String {
        "OK".to_string()
    }
}
