mod demo;
mod export;
mod glyphs;
mod viewer;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use winit::dpi::LogicalSize;

use tessel_engine::coords::ColorRgba;
use tessel_engine::device::GpuInit;
use tessel_engine::logging::{LoggingConfig, init_logging};
use tessel_engine::window::{Runtime, RuntimeConfig};

use crate::export::ExportOptions;
use crate::viewer::Viewer;

#[derive(Debug, Parser)]
#[command(name = "tessel-studio", version, about = "View and export animated tile art")]
struct Cli {
    /// Grid width in tiles.
    #[arg(long, default_value_t = 24, global = true)]
    width: u32,

    /// Grid height in tiles.
    #[arg(long, default_value_t = 16, global = true)]
    height: u32,

    /// Number of animation frames.
    #[arg(long, default_value_t = 8, global = true)]
    frames: usize,

    /// Hold time per frame in seconds.
    #[arg(long, default_value_t = 0.12, global = true)]
    hold: f64,

    /// Background as RRGGBBAA hex; transparent when omitted.
    #[arg(long, global = true, value_parser = parse_color)]
    background: Option<ColorRgba>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open a window and play the art (default).
    View {
        /// Start paused on frame 0.
        #[arg(long)]
        paused: bool,
    },
    /// Render frames offscreen and write PNGs.
    Export {
        #[arg(short, long, default_value = "frames")]
        output: PathBuf,

        /// Output pixels per charset pixel.
        #[arg(long, default_value_t = 1)]
        scale: u32,

        /// Export a single frame.
        #[arg(long)]
        frame: Option<usize>,
    },
}

fn parse_color(s: &str) -> Result<ColorRgba, String> {
    let hex = s.trim_start_matches('#');
    let value = u32::from_str_radix(hex, 16).map_err(|e| format!("invalid color {s:?}: {e}"))?;
    match hex.len() {
        6 => {
            let [_, r, g, b] = value.to_be_bytes();
            Ok(ColorRgba::from_rgba8(r, g, b, 255))
        }
        8 => {
            let [r, g, b, a] = value.to_be_bytes();
            Ok(ColorRgba::from_rgba8(r, g, b, a))
        }
        _ => Err(format!("expected RRGGBB or RRGGBBAA, got {s:?}")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LoggingConfig::from_verbosity(cli.verbose));

    let grid = demo::build(cli.width, cli.height, cli.frames, cli.hold);

    match cli.command.unwrap_or(Command::View { paused: false }) {
        Command::View { paused } => {
            let clear = cli.background.unwrap_or(ColorRgba::new(0.05, 0.05, 0.08, 1.0));
            let config = RuntimeConfig {
                title: "tessel studio".to_string(),
                initial_size: LogicalSize::new(960.0, 640.0),
            };
            Runtime::run(config, GpuInit::default(), Viewer::new(grid, !paused, clear))
        }
        Command::Export {
            output,
            scale,
            frame,
        } => {
            let opts = ExportOptions {
                out_dir: output,
                scale,
                clear: cli.background.unwrap_or(ColorRgba::transparent()),
                frame,
            };
            let written = export::run(grid, &opts)?;
            println!("exported {} frame(s) to {}", written.len(), opts.out_dir.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        assert_eq!(parse_color("#ff0000").unwrap().to_rgba8(), [255, 0, 0, 255]);
        assert_eq!(parse_color("00ff0080").unwrap().to_rgba8(), [0, 255, 0, 128]);
        assert!(parse_color("fff").is_err());
        assert!(parse_color("zzzzzz").is_err());
    }

    #[test]
    fn cli_defaults_to_view() {
        let cli = Cli::try_parse_from(["tessel-studio"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!((cli.width, cli.height, cli.frames), (24, 16, 8));
    }

    #[test]
    fn export_flags_parse() {
        let cli =
            Cli::try_parse_from(["tessel-studio", "export", "-o", "out", "--scale", "2", "-vv"])
                .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Command::Export {
                output,
                scale,
                frame,
            }) => {
                assert_eq!(output, PathBuf::from("out"));
                assert_eq!(scale, 2);
                assert_eq!(frame, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
