//! Command-line interface definition.

use std::net::SocketAddr;

use clap::{Parser, Subcommand, ValueEnum};

use minirpc_core::TracingOutputFormat;
use minirpc_protocol::Serializer;

/// minirpc - serve or call the demo user service
#[derive(Debug, Parser)]
#[command(name = "minirpc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the user service server
    Serve {
        /// Address to listen on
        #[arg(long, env = "MINIRPC_ADDR", default_value = "127.0.0.1:8081")]
        addr: SocketAddr,

        /// Maximum concurrent connections
        #[arg(long, default_value_t = 100)]
        max_connections: usize,

        /// Close connections idle for this many seconds
        #[arg(long)]
        idle_timeout_secs: Option<u64>,

        /// Log line format
        #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
        log_format: LogFormat,
    },

    /// Call `get_by_id` on a running server
    Call {
        /// Server address
        #[arg(long, env = "MINIRPC_ADDR", default_value = "127.0.0.1:8081")]
        addr: String,

        /// User id to look up
        #[arg(long)]
        id: u64,

        /// Give up waiting after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Ask the server to take this long before answering
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,

        /// Send without waiting for a response
        #[arg(long)]
        oneway: bool,

        /// Payload serializer
        #[arg(long, value_enum, default_value_t = SerializerArg::Json)]
        serializer: SerializerArg,

        /// Compress payloads with gzip
        #[arg(long)]
        gzip: bool,
    },
}

/// Log line formats accepted by `serve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormat> for TracingOutputFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
            LogFormat::Json => Self::Json,
        }
    }
}

/// Serializers selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SerializerArg {
    Json,
    Msgpack,
}

impl From<SerializerArg> for Serializer {
    fn from(arg: SerializerArg) -> Self {
        match arg {
            SerializerArg::Json => Self::Json,
            SerializerArg::Msgpack => Self::MsgPack,
        }
    }
}
