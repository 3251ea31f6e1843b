//! Command-line arguments for `coda-dump`
//!
//! Declared with clap's derive macros; the binary only dispatches on
//! [`Commands`].

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::evio::ByteOrder;

#[derive(Parser, Debug, Clone)]
#[command(name = "coda-dump")]
#[command(about = "Decode CODA/EVIO event banks into digitization records")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Decode every event of a file of concatenated event banks
    Decode {
        /// Event file
        file: PathBuf,

        /// Path to configuration file
        #[arg(short = 'f', long = "config")]
        config: Option<PathBuf>,

        /// Byte order of the file (overrides the configuration)
        #[arg(long, value_enum)]
        order: Option<OrderArg>,

        /// Stop after this many events (overrides the configuration)
        #[arg(short = 'n', long = "max-events")]
        max_events: Option<u64>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Count banks per tag without decoding them
    Summary {
        /// Event file
        file: PathBuf,

        /// Byte order of the file
        #[arg(long, value_enum, default_value_t = OrderArg::Big)]
        order: OrderArg,
    },
}

/// Output encoding of decoded events
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON object per line
    Json,
    /// Length-prefixed MessagePack frames
    Msgpack,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderArg {
    Big,
    Little,
}

impl From<OrderArg> for ByteOrder {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Big => ByteOrder::Big,
            OrderArg::Little => ByteOrder::Little,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_defaults() {
        let cli = Cli::try_parse_from(["coda-dump", "decode", "run.evio"]).unwrap();
        let Commands::Decode {
            file,
            config,
            order,
            max_events,
            format,
            output,
        } = cli.command
        else {
            panic!("expected decode");
        };
        assert_eq!(file, PathBuf::from("run.evio"));
        assert!(config.is_none());
        assert!(order.is_none());
        assert!(max_events.is_none());
        assert_eq!(format, OutputFormat::Json);
        assert!(output.is_none());
    }

    #[test]
    fn test_decode_full() {
        let cli = Cli::try_parse_from([
            "coda-dump",
            "decode",
            "run.evio",
            "-f",
            "decode.toml",
            "--order",
            "little",
            "-n",
            "50",
            "--format",
            "msgpack",
            "-o",
            "out.msgpack",
        ])
        .unwrap();
        let Commands::Decode {
            config,
            order,
            max_events,
            format,
            output,
            ..
        } = cli.command
        else {
            panic!("expected decode");
        };
        assert_eq!(config, Some(PathBuf::from("decode.toml")));
        assert_eq!(order.map(ByteOrder::from), Some(ByteOrder::Little));
        assert_eq!(max_events, Some(50));
        assert_eq!(format, OutputFormat::Msgpack);
        assert_eq!(output, Some(PathBuf::from("out.msgpack")));
    }

    #[test]
    fn test_summary() {
        let cli = Cli::try_parse_from(["coda-dump", "summary", "run.evio"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Summary {
                order: OrderArg::Big,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(Cli::try_parse_from(["coda-dump", "decode", "run.evio", "--format", "xml"]).is_err());
    }
}
