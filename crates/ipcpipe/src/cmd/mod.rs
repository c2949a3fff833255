use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Args, Subcommand};
use ipcpipe_pipeline::{PipeAccess, Pipeline, PipelineBuilder};
use ipcpipe_transport::DEFAULT_CAPACITY;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one message to a channel.
    Send(SendArgs),
    /// Print messages received on a channel.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ChannelArgs {
    /// Channel name.
    pub channel: String,
    /// Directory holding shared-memory segments.
    #[arg(long, env = "IPCPIPE_PATH", value_name = "DIR")]
    pub path: Option<PathBuf>,
    /// Channel capacity in bytes; must match an existing channel.
    #[arg(long, env = "IPCPIPE_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    pub capacity: usize,
}

impl ChannelArgs {
    pub fn builder(&self, access: PipeAccess) -> PipelineBuilder {
        let builder = Pipeline::builder(&self.channel, access).capacity(self.capacity);
        match &self.path {
            Some(path) => builder.path(path),
            None => builder,
        }
    }
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("payload").multiple(false)))]
pub struct SendArgs {
    #[command(flatten)]
    pub target: ChannelArgs,
    /// Message name.
    #[arg(long, short = 'n')]
    pub name: Option<String>,
    /// Text value.
    #[arg(long, group = "payload")]
    pub text: Option<String>,
    /// 32-bit integer value.
    #[arg(long, group = "payload", allow_negative_numbers = true)]
    pub int: Option<i32>,
    /// 64-bit integer value.
    #[arg(long, group = "payload", allow_negative_numbers = true)]
    pub long: Option<i64>,
    /// 32-bit float value.
    #[arg(long, group = "payload", allow_negative_numbers = true)]
    pub float: Option<f32>,
    /// 64-bit float value.
    #[arg(long, group = "payload", allow_negative_numbers = true)]
    pub double: Option<f64>,
    /// Boolean value.
    #[arg(long = "bool", group = "payload")]
    pub boolean: Option<bool>,
    /// Raw bytes, hex encoded.
    #[arg(long = "bytes-hex", group = "payload", value_name = "HEX")]
    pub bytes_hex: Option<String>,
    /// Complete JSON envelope object; missing name and sentAt are filled in.
    #[arg(long, group = "payload")]
    pub json: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub target: ChannelArgs,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Ignore messages sent before the listener started.
    #[arg(long)]
    pub discard_past: bool,
    /// Stop listening after this long (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
