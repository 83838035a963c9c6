use std::path::PathBuf;

use clap::Parser;
use wlaunch_core::runtime::{run_daemon, DaemonCommand};

#[derive(Debug, Parser)]
#[command(name = "wlaunch-daemon", version, about = "Clipboard history daemon")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,

    /// Report whether a daemon is running and how many entries it holds.
    #[arg(long, conflicts_with = "stop")]
    ping: bool,

    /// Ask a running daemon to exit.
    #[arg(long)]
    stop: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => {
            let _ = error.print();
            return;
        }
        Err(error) => {
            eprintln!("[wlaunch-daemon] {error}");
            std::process::exit(2);
        }
    };

    let command = if cli.ping {
        DaemonCommand::Ping
    } else if cli.stop {
        DaemonCommand::Stop
    } else {
        DaemonCommand::Run
    };

    if let Err(error) = run_daemon(cli.config.as_deref(), command) {
        eprintln!("[wlaunch-daemon] {error}");
        std::process::exit(error.exit_code());
    }
}
