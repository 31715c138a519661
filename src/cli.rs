//! Command-line interface
//!
//! Maps flags and `CHAT_*` environment variables onto a [`ServerConfig`].

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{
    EchoPolicy, ServerConfig, DEFAULT_HOST, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PORT,
    DEFAULT_UPLOAD_DIR,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Port to listen on. Use 0 for an ephemeral port.
    #[arg(long, env = "CHAT_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind to.
    #[arg(long, env = "CHAT_HOST", default_value_t = DEFAULT_HOST)]
    pub host: IpAddr,

    /// Send each chat line back to its sender as well.
    #[arg(long)]
    pub echo: bool,

    /// Disconnect clients idle for this many seconds.
    #[arg(long)]
    pub read_timeout_secs: Option<u64>,

    /// Upper bound on one broadcast write to a single recipient.
    #[arg(long, default_value_t = 500)]
    pub write_timeout_ms: u64,

    /// Directory receiving `FILE|name|size` uploads.
    #[arg(long, default_value = DEFAULT_UPLOAD_DIR)]
    pub upload_dir: PathBuf,

    /// Largest accepted upload in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,
}

impl Cli {
    pub fn into_config(self) -> ServerConfig {
        let echo = if self.echo {
            EchoPolicy::Echo
        } else {
            EchoPolicy::Suppress
        };

        ServerConfig {
            host: self.host,
            ..ServerConfig::default()
        }
        .with_port(self.port)
        .with_echo(echo)
        .with_read_timeout(self.read_timeout_secs.map(Duration::from_secs))
        .with_write_timeout(Duration::from_millis(self.write_timeout_ms))
        .with_upload_dir(self.upload_dir)
        .with_max_upload_bytes(self.max_upload_bytes)
    }
}
