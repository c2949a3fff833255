mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "ipcpipe", version, about = "Named-channel messaging CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "IPCPIPE_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "ipcpipe", "send", "chat", "--name", "greet", "--text", "hi",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.target.channel, "chat");
                assert_eq!(args.text.as_deref(), Some("hi"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn accepts_negative_numbers() {
        let cli = Cli::try_parse_from(["ipcpipe", "send", "chat", "--int", "-5"])
            .expect("negative int should parse");
        assert!(matches!(cli.command, Command::Send(args) if args.int == Some(-5)));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "ipcpipe", "send", "chat", "--text", "hi", "--int", "1",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_listen_subcommand() {
        let cli = Cli::try_parse_from([
            "ipcpipe",
            "listen",
            "chat",
            "--count",
            "2",
            "--discard-past",
            "--capacity",
            "4096",
        ])
        .expect("listen args should parse");

        match cli.command {
            Command::Listen(args) => {
                assert_eq!(args.count, Some(2));
                assert!(args.discard_past);
                assert_eq!(args.target.capacity, 4096);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
