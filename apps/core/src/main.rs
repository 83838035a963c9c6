use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wlaunch_core::runtime::{run_launcher, LauncherCommand};

#[derive(Debug, Parser)]
#[command(name = "wlaunch", version, about = "Keyboard-driven launcher")]
struct Cli {
    /// Config file (TOML, or JSON by extension).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Print the ranked candidates for a query.
    Query {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Resolve a query and execute one of its candidates.
    Run {
        #[arg(long, default_value_t = 0)]
        pick: usize,
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => {
            let _ = error.print();
            return;
        }
        Err(error) => {
            eprintln!("[wlaunch] {error}");
            std::process::exit(2);
        }
    };

    let command = match cli.command {
        None => LauncherCommand::Interactive,
        Some(CliCommand::Query { text, json }) => LauncherCommand::Query {
            text: text.join(" "),
            json,
        },
        Some(CliCommand::Run { pick, text }) => LauncherCommand::Run {
            text: text.join(" "),
            pick,
        },
    };

    if let Err(error) = run_launcher(cli.config.as_deref(), command) {
        eprintln!("[wlaunch] {error}");
        std::process::exit(error.exit_code());
    }
}
