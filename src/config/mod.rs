pub mod settings;

pub use settings::{FlowControlConfig, MasterConfig, ParityConfig, StopBitsConfig};
