use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "voicekeep-server", about = "Keeps gateway accounts parked in voice channels")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/voicekeep.toml")]
    pub config: String,

    /// Path to the token registry (overrides config)
    #[arg(long)]
    pub tokens: Option<String>,
}
