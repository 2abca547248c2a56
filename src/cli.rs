mod read;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use self::{read::ReadArgs, run::RunArgs};
use crate::{config::DevicesConfig, prelude::*};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: poll the configured devices and persist their consumption changes.
    #[clap(name = "run")]
    Run(Box<RunArgs>),

    /// Read a device once and print the sample, without persisting anything.
    #[clap(name = "read")]
    Read(Box<ReadArgs>),
}

#[derive(Clone, Parser)]
pub struct DevicesArgs {
    /// TOML file listing the energy devices.
    #[clap(long = "devices", env = "DEVICES_PATH")]
    pub path: PathBuf,
}

impl DevicesArgs {
    pub fn read(&self) -> Result<DevicesConfig> {
        DevicesConfig::read_from(&self.path)
    }
}
