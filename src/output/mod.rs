pub mod formatters;
pub mod senders;

pub use formatters::{formatter_for, ConsoleFormatter, HexFormatter, JsonFormatter, ResponseFormatter};
pub use senders::{ConsoleSender, DataSender, FileSender};
