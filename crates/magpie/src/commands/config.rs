//! `magpie config`: read or write configuration values by dotted key.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Context;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print a config value, e.g. `magpie config get channels.bind`
    Get { key: String },
    /// Persist a config value, e.g. `magpie config set channels.bind 0.0.0.0:8080`
    Set { key: String, value: String },
}

pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Get { key } => {
            let config = ctx.load_config()?;
            println!("{}", magpie_config::get_key(&config, &key)?);
        }
        ConfigCommand::Set { key, value } => {
            let path = ctx.config_file()?;
            magpie_config::set_key(&path, &key, &value)?;
            println!("{} = {} ({})", key, value, path.display());
        }
    }
    Ok(())
}
