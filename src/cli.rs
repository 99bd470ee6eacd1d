//! Command line interface for the `bleframe` demo binary.
//!
//! The binary joins a controller and a peer over an in-memory link and moves
//! one payload between them, which makes the framing visible in the logs
//! (`RUST_LOG=bleframe=debug`).

use clap::{Parser, ValueEnum};

/// Timing preset applied to both ends of the link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Long reassembly window, no acknowledgements.
    #[default]
    ServiceAware,
    /// Short reassembly window, paced frames confirmed by acknowledgements.
    Legacy,
}

/// Command line arguments for the `bleframe` binary.
#[derive(Debug, Parser)]
#[command(
    name = "bleframe",
    version,
    about = "Move a payload across an in-memory BLE notification link"
)]
pub struct Cli {
    /// Size of the generated payload in bytes.
    #[arg(short = 'n', long, default_value_t = 512)]
    pub payload_len: usize,

    /// Bytes per raw packet.
    #[arg(short, long, default_value_t = 20)]
    pub budget: usize,

    /// Timing preset.
    #[arg(short, long, value_enum, default_value_t = Mode::ServiceAware)]
    pub mode: Mode,

    /// Send the payload as a chunked request and wait for the echo.
    #[arg(short, long)]
    pub request: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Mode};

    #[test]
    fn defaults_describe_a_service_aware_write() {
        let cli = Cli::parse_from(["bleframe"]);
        assert_eq!(cli.payload_len, 512);
        assert_eq!(cli.budget, 20);
        assert_eq!(cli.mode, Mode::ServiceAware);
        assert!(!cli.request);
    }

    #[test]
    fn parses_legacy_request() {
        let cli = Cli::parse_from([
            "bleframe",
            "--mode",
            "legacy",
            "--request",
            "--payload-len",
            "64",
            "-b",
            "185",
        ]);
        assert_eq!(cli.mode, Mode::Legacy);
        assert!(cli.request);
        assert_eq!(cli.payload_len, 64);
        assert_eq!(cli.budget, 185);
    }
}
