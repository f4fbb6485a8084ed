//! dicectl - deploy and supervise the Mr.Dice database services

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use mrdice_core::{EnvName, Selection};

mod commands;
mod format;
mod logging;

use commands::{cmd_config_init, cmd_config_show, cmd_deploy, cmd_logs, cmd_start, cmd_status, cmd_stop};
use logging::{init_cli_logging, init_command_logging};

#[derive(Parser)]
#[command(name = "dicectl")]
#[command(about = "Deploy and supervise the Mr.Dice database services")]
#[command(version)]
#[command(after_help = "\
QUICK START:
  dicectl deploy                  # Restart the whole fleet (env: test)
  dicectl deploy -e prod          # Restart the fleet with the prod profile
  dicectl deploy -d optimade      # Restart one database service
  dicectl status                  # Show what is running
  dicectl logs optimade -f        # Follow a service log

DATABASES:
  bohriumpublic, mofdbsql, openlam, optimade, all (default; includes the agent)

ENVIRONMENTS:
  test (default), uat, prod")]
#[derive(Debug)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Stop and relaunch services, then wait for them to accept connections
  Deploy {
    /// Environment profile: test, uat, prod
    #[arg(short, long, default_value = "test")]
    env: String,
    /// Database to act on, or "all"
    #[arg(short = 'd', long, alias = "db", default_value = "all")]
    database: String,
  },
  /// Launch services that are not already running
  Start {
    /// Environment profile: test, uat, prod
    #[arg(short, long, default_value = "test")]
    env: String,
    /// Database to act on, or "all"
    #[arg(short = 'd', long, alias = "db", default_value = "all")]
    database: String,
  },
  /// Stop services
  Stop {
    /// Database to act on, or "all"
    #[arg(short = 'd', long, alias = "db", default_value = "all")]
    database: String,
  },
  /// Show the state of the fleet
  Status {
    /// Database to show, or "all"
    #[arg(short = 'd', long, alias = "db", default_value = "all")]
    database: String,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Show or follow a service log
  Logs {
    /// Service name (omit to list log files)
    service: Option<String>,
    /// Number of lines to show
    #[arg(short = 'n', long, default_value = "50")]
    lines: usize,
    /// Follow the log (tail -f)
    #[arg(short, long)]
    follow: bool,
  },
  /// Manage configuration
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
  /// Generate shell completions
  Completions {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: clap_complete::Shell,
  },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
  /// Show the effective configuration and where it came from
  Show,
  /// Write a commented dicectl.toml to the current directory
  Init {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  // Commands that mutate the fleet also log a transcript to a file
  let _guard = match &cli.command {
    Commands::Deploy { .. } | Commands::Start { .. } | Commands::Stop { .. } => init_command_logging(),
    _ => {
      init_cli_logging();
      None
    }
  };

  match cli.command {
    Commands::Deploy { env, database } => cmd_deploy(parse_env(&env)?, parse_selection(&database)?).await,
    Commands::Start { env, database } => cmd_start(parse_env(&env)?, parse_selection(&database)?).await,
    Commands::Stop { database } => cmd_stop(parse_selection(&database)?).await,
    Commands::Status { database, json } => cmd_status(parse_selection(&database)?, json),
    Commands::Logs { service, lines, follow } => cmd_logs(service.as_deref(), lines, follow),
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show(),
      ConfigCommand::Init { force } => cmd_config_init(force),
    },
    Commands::Completions { shell } => {
      let mut cmd = Cli::command();
      let name = cmd.get_name().to_string();
      clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
      Ok(())
    }
  }
}

/// Validated after parsing, not by clap, so an unrecognized value exits 1
/// with a plain message rather than clap's usage error (exit 2).
fn parse_env(value: &str) -> Result<EnvName> {
  value.parse().map_err(anyhow::Error::msg)
}

fn parse_selection(value: &str) -> Result<Selection> {
  value.parse().map_err(anyhow::Error::msg)
}
