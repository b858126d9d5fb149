// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use reply_harvester::cli;

#[derive(Parser)]
#[command(
    name = "harvester",
    about = "Harvester — headless report extraction for Reply.io",
    version,
    after_help = "Run 'harvester <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download reports for a configured client
    Fetch {
        /// Client id from clients.json
        client: String,
        /// Fetch a single report instead of both
        #[arg(long, value_enum)]
        report: Option<reply_harvester::reports::ReportKind>,
        /// Trigger-then-poll attempts for the asynchronous export
        #[arg(long, default_value = "4")]
        max_attempts: u32,
        /// Run with a visible browser window
        #[arg(long)]
        no_headless: bool,
    },
    /// List the workspaces visible to the configured account
    Workspaces {
        /// Run with a visible browser window
        #[arg(long)]
        no_headless: bool,
    },
    /// Start the HTTP/SSE API
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "7700")]
        port: u16,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Fetch {
            client,
            report,
            max_attempts,
            no_headless,
        } => cli::fetch_cmd::run(&client, report, max_attempts, no_headless).await,
        Commands::Workspaces { no_headless } => cli::workspaces_cmd::run(no_headless).await,
        Commands::Serve { port } => cli::serve_cmd::run(port).await,
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "harvester", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }
    result
}

fn init_tracing(verbose: bool, quiet: bool) {
    let directive = if verbose {
        "reply_harvester=debug"
    } else if quiet {
        "reply_harvester=error"
    } else {
        "reply_harvester=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().unwrap()),
        )
        .init();
}
