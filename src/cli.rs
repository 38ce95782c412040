//! Command line interface of the `framecast` binary.

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::protocol::{ByteOrder, DEFAULT_MAX_FRAME_SIZE};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a broadcast server: every frame received goes out to every session.
    Server(ServerArgs),
    /// Connect to a server and chat from stdin.
    Client(ClientArgs),
}

/// Length prefix byte order as accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrderArg {
    /// Network order.
    #[default]
    Big,
    /// Little endian.
    Little,
    /// Whatever this machine uses.
    Native,
}

impl From<ByteOrderArg> for ByteOrder {
    fn from(arg: ByteOrderArg) -> Self {
        match arg {
            ByteOrderArg::Big => ByteOrder::Big,
            ByteOrderArg::Little => ByteOrder::Little,
            ByteOrderArg::Native => ByteOrder::native(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Endpoint to listen on: host:port, tcp://host:port or unix:/path. Port 0 picks one.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub listen: String,

    /// Largest frame accepted from a client, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: u32,

    /// Byte order of the length prefix.
    #[arg(long, value_enum, default_value_t = ByteOrderArg::Big)]
    pub byte_order: ByteOrderArg,

    /// Reply to the sender only instead of broadcasting.
    #[arg(long, conflicts_with = "exclude_sender")]
    pub echo: bool,

    /// Do not send a client's own frames back to it.
    #[arg(long)]
    pub exclude_sender: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Server endpoint to connect to.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub server: String,

    /// Name shown next to your lines.
    #[arg(long)]
    pub nickname: String,

    /// Byte order of the length prefix.
    #[arg(long, value_enum, default_value_t = ByteOrderArg::Big)]
    pub byte_order: ByteOrderArg,
}
