use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "PBMG CLI - Multigrid Poisson-Boltzmann electrostatics for biomolecules: potentials, solvation energies and per-atom forces.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Solve every calculation of an input deck and report energies, forces and grids.
    Run(RunArgs),
    /// Load an input deck and its molecules, resolve all parameters and print them without solving.
    Check(CheckArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to the input deck in TOML format.
    #[arg(value_name = "DECK")]
    pub deck: PathBuf,

    /// Directory receiving grid (OpenDX) and table (CSV) outputs.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Override the multigrid cycle budget of every calculation.
    #[arg(long, value_name = "NUM")]
    pub max_cycles: Option<usize>,

    /// Override the relative residual tolerance of every calculation.
    #[arg(long, value_name = "FLOAT")]
    pub tolerance: Option<f64>,

    /// Report energies in kJ/mol instead of kT.
    #[arg(long)]
    pub kj: bool,

    /// Override a deck value for every calculation (e.g., --set pbe.temperature=310).
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set_values: Vec<String>,
}

/// Arguments for the `check` subcommand.
#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Path to the input deck in TOML format.
    #[arg(value_name = "DECK")]
    pub deck: PathBuf,

    /// Override a deck value for every calculation (e.g., --set grid.levels=3).
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set_values: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_arguments_parse_with_overrides() {
        let cli = Cli::try_parse_from([
            "pbmg",
            "-vv",
            "-j",
            "4",
            "run",
            "deck.toml",
            "--output-dir",
            "out",
            "--max-cycles",
            "50",
            "--set",
            "pbe.temperature=310",
            "--set",
            "solver.tolerance=1e-8",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.threads, Some(4));
        let Commands::Run(args) = cli.command else {
            panic!("expected the run subcommand");
        };
        assert_eq!(args.deck, PathBuf::from("deck.toml"));
        assert_eq!(args.output_dir, PathBuf::from("out"));
        assert_eq!(args.max_cycles, Some(50));
        assert_eq!(args.set_values.len(), 2);
        assert!(!args.kj);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["pbmg", "-q", "-v", "check", "deck.toml"]);
        assert!(result.is_err());
    }
}
