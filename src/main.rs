mod app;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use tally::config::Config;
use tally::logging;
use tally::permissions::Role;

#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Cache-first business ledger client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tally/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Today's and this month's totals, and who owes the most
  Dashboard,
  /// Customer list; without a query shows customers who owe
  Customers {
    #[arg(short, long)]
    search: Option<String>,
  },
  /// Recent transactions
  Transactions,
  /// Signed-in user's profile
  Profile,
  /// Manage the business's team
  Team {
    #[command(subcommand)]
    action: TeamAction,
  },
}

#[derive(Subcommand, Debug)]
pub enum TeamAction {
  /// Active members and their roles
  List,
  /// Add a member
  Invite {
    #[arg(long)]
    name: String,
    #[arg(long)]
    phone: String,
    #[arg(long, default_value = "worker")]
    role: Role,
  },
  /// Change a member's role
  Role {
    #[arg(long)]
    member: String,
    #[arg(long)]
    role: Role,
  },
  /// Deactivate a member
  Remove {
    #[arg(long)]
    member: String,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config)?;

  let app = app::App::new(config)?;
  app.run(args.command).await?;

  Ok(())
}
