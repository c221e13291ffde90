use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "voice-notify", version, about = "Discord voice channel activity notifications")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,
}
