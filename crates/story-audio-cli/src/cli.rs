use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::sim::SimConfig;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "story-player", version = VERSION)]
pub struct Args {
    /// Optional coordinator config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Initial output volume (0.0 - 1.0); overrides the config file
    #[arg(long)]
    pub volume: Option<f32>,

    /// Simulated load latency before the primitive reports ready
    #[arg(long, default_value_t = 400)]
    pub load_delay_ms: u64,

    /// Simulated length of every track, in seconds
    #[arg(long, default_value_t = 20.0)]
    pub track_secs: f64,

    /// How often the simulated primitive reports progress
    #[arg(long, default_value_t = 250)]
    pub tick_ms: u64,
}

impl Args {
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            load_delay: Duration::from_millis(self.load_delay_ms),
            track_secs: self.track_secs.max(0.1),
            tick: Duration::from_millis(self.tick_ms.max(10)),
        }
    }
}
