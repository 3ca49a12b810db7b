use crate::bench::{FileOpt, TraceBench};
use crate::Error;
use clap::ValueHint::FilePath;
use clap::{Args, Parser, Subcommand};
use log::{debug, error};
use std::fs::read_to_string;
use std::path::PathBuf;

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(short = 'c')]
    #[arg(value_hint = FilePath)]
    #[arg(help = "Path to the TOML config file (defaults apply if omitted)")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct GenArgs {
    #[command(flatten)]
    config: ConfigArgs,

    #[arg(short = 'i')]
    #[arg(value_hint = FilePath)]
    #[arg(help = "Path to the input corpus, one JSON record per line")]
    input: PathBuf,

    #[arg(short = 'o', default_value = "benchmark.trace")]
    #[arg(value_hint = FilePath)]
    #[arg(help = "Path to the output trace")]
    output: PathBuf,

    #[arg(short = 's', default_value = "sorted.dat")]
    #[arg(value_hint = FilePath)]
    #[arg(help = "Path to the sorted intermediate file")]
    sorted: PathBuf,

    #[arg(short = 'p')]
    #[arg(help = "The input is already sorted by time")]
    pre_sorted: bool,

    #[arg(short = 'k')]
    #[arg(help = "Keep the sorted intermediate file")]
    keep_sorted: bool,
}

#[derive(Args, Debug)]
struct SortArgs {
    #[command(flatten)]
    config: ConfigArgs,

    #[arg(short = 'i')]
    #[arg(value_hint = FilePath)]
    #[arg(help = "Path to the input corpus, one JSON record per line")]
    input: PathBuf,

    #[arg(short = 'o')]
    #[arg(value_hint = FilePath)]
    #[arg(help = "Path to the sorted output")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct StatsArgs {
    #[command(flatten)]
    config: ConfigArgs,

    #[arg(short = 'i')]
    #[arg(value_hint = FilePath)]
    #[arg(help = "Path to the input corpus, one JSON record per line")]
    input: PathBuf,

    #[arg(short = 'p')]
    #[arg(help = "The input is already sorted by time, only peek at its ends")]
    pre_sorted: bool,
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Generate a trace from a corpus")]
    Gen(GenArgs),
    #[command(about = "Sort a corpus by time")]
    Sort(SortArgs),
    #[command(about = "Print the statistics of a corpus")]
    Stats(StatsArgs),
    #[command(about = "List all registered population models")]
    List,
}

fn load(args: &ConfigArgs) -> Result<TraceBench, Error> {
    let text = match args.config.as_ref() {
        Some(path) => read_to_string(path)?,
        None => String::new(),
    };
    crate::bench::init(&text)
}

fn gen_cli(args: &GenArgs) -> Result<(), Error> {
    let bench = load(&args.config)?;
    let files = FileOpt {
        input: args.input.clone(),
        output: args.output.clone(),
        sorted: args.sorted.clone(),
        pre_sorted: args.pre_sorted,
        keep_sorted: args.keep_sorted,
    };
    let summary = bench.generate(&files)?;
    println!("{}", summary);
    Ok(())
}

fn sort_cli(args: &SortArgs) -> Result<(), Error> {
    let bench = load(&args.config)?;
    let stats = bench.sort(&args.input, &args.output)?;
    println!("{}", stats);
    Ok(())
}

fn stats_cli(args: &StatsArgs) -> Result<(), Error> {
    let bench = load(&args.config)?;
    let stats = bench.stats(&args.input, args.pre_sorted)?;
    println!("{}", stats);
    Ok(())
}

fn list_cli() {
    for name in crate::models::registered() {
        println!("Registered model: {}", name);
    }
}

/// The default command line interface.
///
/// This function is public and can be called in a different crate. For example, one can integrate
/// their own population models by registering the constructor function. Then, adding this function
/// will produce a binary that has the same usage as the one in this crate.
///
/// ## Usage
///
/// To get the usage of the command line interface, users can run:
///
/// ```bash
/// tracebench -h
/// ```
///
/// The interface supports four modes, `gen`, `sort`, `stats` and `list`. Every mode except `list`
/// takes an optional `-c <CONFIG>`, the path of a configuration file formatted as documented in
/// [`crate::bench`].
///
/// ### Generation Mode
///
/// Usage:
///
/// ```bash
/// tracebench gen [-c <CONFIG>] -i <INPUT> [-o <OUTPUT>] [-s <SORTED>] [-p] [-k]
/// ```
///
/// Reads the corpus `INPUT`, sorts it into `SORTED` (default `sorted.dat`) and writes the trace
/// into `OUTPUT` (default `benchmark.trace`). With `-p`, the input is taken as already sorted and
/// the sorting step is skipped. The sorted file is removed afterwards unless `-k` is given. A
/// one-line summary of the run is printed, see [`crate::trace`] for its format.
///
/// ### Sort Mode
///
/// Usage:
///
/// ```bash
/// tracebench sort [-c <CONFIG>] -i <INPUT> -o <OUTPUT>
/// ```
///
/// Only sorts the corpus, which can later be fed to `gen -p`.
///
/// ### Stats Mode
///
/// Usage:
///
/// ```bash
/// tracebench stats [-c <CONFIG>] -i <INPUT> [-p]
/// ```
///
/// Prints the number of records and the time span of the corpus. With `-p`, only the first and
/// last records are decoded, which is only correct for sorted input.
///
/// ### List mode
///
/// Usage:
/// ``` bash
/// tracebench list
/// ```
///
/// This command lists all registered population models' names.
///
/// Failures are logged and the process exits with status 1. Set `RUST_LOG` (e.g., `info` or
/// `debug`) to see progress messages.
pub fn cmdline() {
    env_logger::init();
    let cli = Cli::parse();
    debug!("Starting tracebench with args: {:?}", cli);
    let result = match cli.command {
        Commands::Gen(args) => gen_cli(&args),
        Commands::Sort(args) => sort_cli(&args),
        Commands::Stats(args) => stats_cli(&args),
        Commands::List => {
            list_cli();
            Ok(())
        }
    };
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn gen_defaults() {
        let cli = Cli::try_parse_from(["tracebench", "gen", "-i", "corpus.json"]).unwrap();
        let Commands::Gen(args) = cli.command else {
            panic!("expected gen");
        };
        assert_eq!(args.input, PathBuf::from("corpus.json"));
        assert_eq!(args.output, PathBuf::from("benchmark.trace"));
        assert_eq!(args.sorted, PathBuf::from("sorted.dat"));
        assert!(args.config.config.is_none());
        assert!(!args.pre_sorted && !args.keep_sorted);
    }

    #[test]
    fn gen_flags() {
        let cli = Cli::try_parse_from([
            "tracebench", "gen", "-c", "a.toml", "-i", "in", "-o", "out", "-s", "tmp", "-p", "-k",
        ])
        .unwrap();
        let Commands::Gen(args) = cli.command else {
            panic!("expected gen");
        };
        assert_eq!(args.config.config, Some(PathBuf::from("a.toml")));
        assert_eq!(args.output, PathBuf::from("out"));
        assert_eq!(args.sorted, PathBuf::from("tmp"));
        assert!(args.pre_sorted && args.keep_sorted);
    }

    #[test]
    fn missing_arguments() {
        assert!(Cli::try_parse_from(["tracebench", "gen"]).is_err());
        assert!(Cli::try_parse_from(["tracebench", "sort", "-i", "in"]).is_err());
        assert!(Cli::try_parse_from(["tracebench", "stats", "-i", "in", "-p"]).is_ok());
    }

    #[test]
    fn missing_config_file() {
        let args = ConfigArgs {
            config: Some(PathBuf::from("/nonexistent/tracebench.toml")),
        };
        assert!(matches!(load(&args), Err(Error::Io(_))));
    }
}
