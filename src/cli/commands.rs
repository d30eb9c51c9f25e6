use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::info;

use crate::config::MasterConfig;
use crate::modbus::{
    crc16, ModbusRequest, ModbusResponse, ModbusRtuMaster, RawPduCodec, SlaveId, StandardCodec,
};
use crate::output::{formatter_for, ConsoleSender, DataSender, FileSender, ResponseFormatter};
use crate::transport::SerialPortTransport;

pub fn build_cli() -> Command {
    let address = || Arg::new("address").required(true).help("Start address (decimal or 0x hex)");
    let quantity = || Arg::new("quantity").required(true).help("Number of items");

    Command::new("rtu-master")
        .version(crate::VERSION)
        .about("Modbus RTU master over a serial line")
        .arg(Arg::new("config").short('c').long("config").help("TOML configuration file"))
        .arg(Arg::new("port").short('p').long("port").help("Serial port name"))
        .arg(Arg::new("baud").short('b').long("baud").help("Baud rate"))
        .arg(Arg::new("timeout").short('t').long("timeout").help("Open/reply timeout in ms"))
        .arg(Arg::new("parity").long("parity").help("none, even or odd"))
        .arg(Arg::new("slave").short('s').long("slave").default_value("1").help("Slave address"))
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .default_value("console")
                .help("console, json or hex"),
        )
        .arg(Arg::new("output-file").short('o').long("output-file").help("Append results to a file"))
        .arg(
            Arg::new("no-address-check")
                .long("no-address-check")
                .action(ArgAction::SetTrue)
                .help("Accept replies from any slave address"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Debug logging, including frame dumps"),
        )
        .subcommand(Command::new("read-coils").arg(address()).arg(quantity()))
        .subcommand(Command::new("read-discrete").arg(address()).arg(quantity()))
        .subcommand(Command::new("read-holding").arg(address()).arg(quantity()))
        .subcommand(Command::new("read-input").arg(address()).arg(quantity()))
        .subcommand(
            Command::new("write-coil")
                .arg(address())
                .arg(Arg::new("value").required(true).help("on/off, 1/0, true/false")),
        )
        .subcommand(
            Command::new("write-register")
                .arg(address())
                .arg(Arg::new("value").required(true).help("Register value")),
        )
        .subcommand(
            Command::new("write-coils")
                .arg(address())
                .arg(Arg::new("values").required(true).help("Comma separated, e.g. 1,0,1")),
        )
        .subcommand(
            Command::new("write-registers")
                .arg(address())
                .arg(Arg::new("values").required(true).help("Comma separated register values")),
        )
        .subcommand(
            Command::new("raw")
                .about("Send a raw PDU given as hex, e.g. 0300000001")
                .arg(Arg::new("pdu").required(true)),
        )
        .subcommand(Command::new("crc").about("Print the CRC of a hex frame").arg(Arg::new("hex").required(true)))
        .subcommand(Command::new("list-ports").about("List serial ports"))
        .subcommand(
            Command::new("save-config")
                .about("Write the effective configuration to a TOML file")
                .arg(Arg::new("path").required(true)),
        )
}

/// Runs the selected subcommand. Returns `Ok(false)` when none was given.
pub fn handle_subcommands(matches: &ArgMatches, config: MasterConfig) -> Result<bool> {
    let formatter = formatter_for(
        matches.get_one::<String>("format").map(String::as_str).unwrap_or("console"),
    );
    let sender: Box<dyn DataSender> = match matches.get_one::<String>("output-file") {
        Some(path) => {
            info!("📝 Adding file output: {}", path);
            Box::new(FileSender::new(path))
        }
        None => Box::new(ConsoleSender),
    };
    let slave_id: SlaveId = parse_number(matches.get_one::<String>("slave").map(String::as_str).unwrap_or("1"))?;

    let Some((name, sub)) = matches.subcommand() else {
        return Ok(false);
    };

    let output = match name {
        "list-ports" => list_ports()?,
        "crc" => {
            let bytes = decode_hex(arg(sub, "hex")?)?;
            let crc = crc16(&bytes);
            format!("{} -> {}", hex::encode_upper(&bytes), hex::encode_upper(crc.to_be_bytes()))
        }
        "save-config" => {
            let path = arg(sub, "path")?;
            config.save_to_file(path)?;
            format!("💾 Configuration saved to {}", path)
        }
        "raw" => {
            let pdu = decode_hex(arg(sub, "pdu")?)?;
            let mut master = ModbusRtuMaster::with_transport(config, SerialPortTransport, RawPduCodec);
            let reply = master.send_request(&pdu, slave_id)?;
            formatter.format_raw(slave_id, &reply)
        }
        _ => {
            let request = parse_request(name, sub)?;
            let mut master = ModbusRtuMaster::with_transport(config, SerialPortTransport, StandardCodec);
            run_standard(&mut master, &request, slave_id, formatter.as_ref())?
        }
    };

    sender.send(&output).with_context(|| format!("Failed to write to {}", sender.destination()))?;
    Ok(true)
}

fn run_standard(
    master: &mut ModbusRtuMaster<SerialPortTransport, StandardCodec>,
    request: &ModbusRequest,
    slave_id: SlaveId,
    formatter: &dyn ResponseFormatter,
) -> Result<String> {
    let output = match request {
        ModbusRequest::ReadCoils { address, quantity } => {
            let bits = master.read_coils(slave_id, *address, *quantity)?;
            formatter.format_response(slave_id, &ModbusResponse::ReadCoils(bits))
        }
        ModbusRequest::ReadDiscreteInputs { address, quantity } => {
            let bits = master.read_discrete_inputs(slave_id, *address, *quantity)?;
            formatter.format_response(slave_id, &ModbusResponse::ReadDiscreteInputs(bits))
        }
        ModbusRequest::ReadHoldingRegisters { address, quantity } => {
            let values = master.read_holding_registers(slave_id, *address, *quantity)?;
            formatter.format_response(slave_id, &ModbusResponse::ReadHoldingRegisters(values))
        }
        ModbusRequest::ReadInputRegisters { address, quantity } => {
            let values = master.read_input_registers(slave_id, *address, *quantity)?;
            formatter.format_response(slave_id, &ModbusResponse::ReadInputRegisters(values))
        }
        ModbusRequest::WriteSingleCoil { address, value } => {
            master.write_single_coil(slave_id, *address, *value)?;
            formatter.format_ack(slave_id, "write-coil")
        }
        ModbusRequest::WriteSingleRegister { address, value } => {
            master.write_single_register(slave_id, *address, *value)?;
            formatter.format_ack(slave_id, "write-register")
        }
        ModbusRequest::WriteMultipleCoils { address, values } => {
            master.write_multiple_coils(slave_id, *address, values)?;
            formatter.format_ack(slave_id, "write-coils")
        }
        ModbusRequest::WriteMultipleRegisters { address, values } => {
            master.write_multiple_registers(slave_id, *address, values)?;
            formatter.format_ack(slave_id, "write-registers")
        }
    };
    Ok(output)
}

/// Builds a request from a data-access subcommand.
pub fn parse_request(name: &str, sub: &ArgMatches) -> Result<ModbusRequest> {
    let address: u16 = parse_number(arg(sub, "address")?)?;
    let request = match name {
        "read-coils" => ModbusRequest::ReadCoils { address, quantity: parse_number(arg(sub, "quantity")?)? },
        "read-discrete" => {
            ModbusRequest::ReadDiscreteInputs { address, quantity: parse_number(arg(sub, "quantity")?)? }
        }
        "read-holding" => {
            ModbusRequest::ReadHoldingRegisters { address, quantity: parse_number(arg(sub, "quantity")?)? }
        }
        "read-input" => {
            ModbusRequest::ReadInputRegisters { address, quantity: parse_number(arg(sub, "quantity")?)? }
        }
        "write-coil" => ModbusRequest::WriteSingleCoil { address, value: parse_bool(arg(sub, "value")?)? },
        "write-register" => {
            ModbusRequest::WriteSingleRegister { address, value: parse_number(arg(sub, "value")?)? }
        }
        "write-coils" => ModbusRequest::WriteMultipleCoils {
            address,
            values: split_list(arg(sub, "values")?).map(parse_bool).collect::<Result<Vec<_>>>()?,
        },
        "write-registers" => ModbusRequest::WriteMultipleRegisters {
            address,
            values: split_list(arg(sub, "values")?).map(parse_number::<u16>).collect::<Result<Vec<_>>>()?,
        },
        other => return Err(anyhow!("Unknown command: {}", other)),
    };
    Ok(request)
}

fn list_ports() -> Result<String> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        return Ok("⚠️  No serial ports found".to_string());
    }

    let mut output = String::from("📡 Available Serial Ports:\n");
    for (index, port) in ports.iter().enumerate() {
        output.push_str(&format!("   {}. {}\n", index + 1, port.port_name));
        if let serialport::SerialPortType::UsbPort(usb_info) = &port.port_type {
            if let Some(manufacturer) = &usb_info.manufacturer {
                output.push_str(&format!("      📱 Manufacturer: {}\n", manufacturer));
            }
        }
    }
    Ok(output)
}

fn arg<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing argument: {}", name))
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Accepts decimal or `0x`-prefixed hex.
pub fn parse_number<N>(text: &str) -> Result<N>
where
    N: TryFrom<u32>,
{
    let text = text.trim();
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse::<u32>(),
    }
    .with_context(|| format!("Invalid number: {}", text))?;
    N::try_from(value).map_err(|_| anyhow!("Number out of range: {}", text))
}

pub fn parse_bool(text: &str) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "true" => Ok(true),
        "0" | "off" | "false" => Ok(false),
        other => Err(anyhow!("Invalid coil value: {}", other)),
    }
}

fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).with_context(|| format!("Invalid hex: {}", text))
}
