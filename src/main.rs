use anyhow::Result;
use log::{debug, error};

use rtu_master::cli::{build_cli, handle_subcommands};
use rtu_master::MasterConfig;

fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let default_level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = MasterConfig::from_matches(&matches)?;
    debug!("Effective configuration: {:?}", config);

    match handle_subcommands(&matches, config) {
        Ok(true) => Ok(()),
        Ok(false) => {
            build_cli().print_help()?;
            println!();
            Ok(())
        }
        Err(e) => {
            error!("💥 {:#}", e);
            Err(e)
        }
    }
}
