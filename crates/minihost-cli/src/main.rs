//! minihost - console VST2 host

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "minihost")]
#[command(about = "Load a VST2 plugin, inspect it, render audio and manage presets")]
struct Cli {
    /// Sample rate in Hz
    #[arg(long, global = true, default_value = "44100")]
    sample_rate: f32,

    /// Maximum frames per process call
    #[arg(long, global = true, default_value = "512")]
    block_size: usize,

    /// Use the built-in demo plugin instead of loading <PLUGIN>
    #[arg(long, global = true)]
    mock: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct PersistArgs {
    /// Plugin shared library or .vst bundle
    plugin: PathBuf,

    /// Preset (.fxp) or bank (.fxb) file
    file: PathBuf,

    /// Accept files written by a newer plugin version
    #[arg(long)]
    skip_version_check: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print plugin metadata, capabilities and programs
    Info { plugin: PathBuf },

    /// Print every parameter of the current program
    Dump {
        plugin: PathBuf,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Play one note through the plugin and write a WAV file
    Render {
        plugin: PathBuf,

        #[arg(long, default_value = "60")]
        note: u8,

        #[arg(long, default_value = "100")]
        velocity: u8,

        #[arg(long, default_value = "2.0")]
        seconds: f32,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Save the current program to an .fxp file
    SavePreset(PersistArgs),

    /// Load an .fxp file into the current program
    LoadPreset(PersistArgs),

    /// Save every program to an .fxb file
    SaveBank(PersistArgs),

    /// Load an .fxb file
    LoadBank(PersistArgs),

    /// Print the header of an .fxp or .fxb file
    Inspect { file: PathBuf },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match commands::run(&cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "minihost",
            "info",
            "synth.so",
            "--sample-rate",
            "48000",
            "--mock",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.sample_rate, 48000.0);
        assert_eq!(cli.block_size, 512);
        assert!(cli.mock);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Info { .. }));
    }

    #[test]
    fn test_persist_args() {
        let cli = Cli::try_parse_from([
            "minihost",
            "load-bank",
            "synth.so",
            "factory.fxb",
            "--skip-version-check",
        ])
        .unwrap();
        match cli.command {
            Commands::LoadBank(args) => {
                assert_eq!(args.file, PathBuf::from("factory.fxb"));
                assert!(args.skip_version_check);
            }
            other => panic!("expected load-bank, got {:?}", other),
        }
    }

    #[test]
    fn test_render_requires_output() {
        assert!(Cli::try_parse_from(["minihost", "render", "synth.so"]).is_err());
    }
}
