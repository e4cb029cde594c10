use argh::FromArgs;
use std::{path::PathBuf, time::Duration};

use crate::fetch::FetchConfig;

// defaults for the server
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3333;
pub const DEFAULT_MODEL_DIR: &str = "model";

#[derive(FromArgs, Debug)]
/// Serve object detections for remote JPEG images over HTTP.
pub struct ServerArgs {
    /// the host to run the server on
    #[argh(option, default = "DEFAULT_HOST.to_string()")]
    pub host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    pub port: u16,

    /// directory holding model.cfg, model.weights and model.meta
    #[argh(option, default = "PathBuf::from(DEFAULT_MODEL_DIR)")]
    pub model_dir: PathBuf,

    /// log at debug level (also enabled by DEBUG=True)
    #[argh(switch, short = 'd')]
    pub debug: bool,

    /// serve requests from a single thread
    #[argh(switch)]
    pub single_threaded: bool,

    /// upstream connect timeout in milliseconds
    #[argh(option, default = "100")]
    pub connect_timeout_ms: u64,

    /// upstream read timeout in milliseconds
    #[argh(option, default = "5000")]
    pub read_timeout_ms: u64,
}

/// Resolved process configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub bind_addr: String,
    pub model_dir: PathBuf,
    pub debug: bool,
    pub single_threaded: bool,
    pub fetch: FetchConfig,
}

impl Config {
    /// Merges command line arguments with the value of the `DEBUG` variable.
    pub fn new(args: ServerArgs, debug_env: Option<&str>) -> Self {
        Self {
            bind_addr: format!("{}:{}", args.host, args.port),
            model_dir: args.model_dir,
            debug: args.debug || debug_env == Some("True"),
            single_threaded: args.single_threaded,
            fetch: FetchConfig {
                connect_timeout: Duration::from_millis(args.connect_timeout_ms),
                read_timeout: Duration::from_millis(args.read_timeout_ms),
            },
        }
    }

    pub fn from_env() -> Self {
        let args: ServerArgs = argh::from_env();
        let debug_env = std::env::var("DEBUG").ok();
        Self::new(args, debug_env.as_deref())
    }

    /// Default `env_logger` filter, used when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }
}
