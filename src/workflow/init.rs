//! `init`: write the default pipeline config.
use super::EXIT_OK;
use crate::cli::InitArgs;
use crate::config::{default_config, write_config};
use anyhow::{anyhow, Result};

pub fn run_init(args: &InitArgs) -> Result<u8> {
    if args.config.exists() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            args.config.display()
        ));
    }
    write_config(&args.config, &default_config())?;
    println!("wrote {}", args.config.display());
    Ok(EXIT_OK)
}
