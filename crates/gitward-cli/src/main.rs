//! gitward - keeps a GitOps repository in sync with its hosting service and
//! applies object patches to it over HTTP.

use clap::Parser;

mod commands;
mod logging;
mod output;
mod server;
mod services;

use commands::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_format);

    let result = match &cli.command {
        Commands::Serve => commands::serve::run(&cli.config),
        Commands::Sync { repository } => commands::sync::run(&cli.config, repository.as_deref()),
        Commands::Patch { api, delete, file } => {
            commands::patch::run(&cli.config, api, *delete, file)
        }
        Commands::Completions { shell } => commands::completions::run(*shell),
    };

    if let Err(e) = result {
        output::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}
