//! sourcelens CLI: serve the daemon, or run one-shot index/search/stats/health
//! operations directly against a project's chunk store.

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

mod commands;
mod logging;

use commands::{cmd_health, cmd_index, cmd_search_regex, cmd_search_semantic, cmd_serve, cmd_stats};
use logging::init_cli_logging;

#[derive(Parser)]
#[command(name = "sourcelens")]
#[command(about = "Local-first code search over a tree-sitter-parsed, embedded chunk store")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the daemon in the foreground: watches the project, backfills
  /// embeddings, and serves search over stdio (and optionally TCP).
  Serve {
    /// Project root (default: current directory)
    #[arg(long)]
    root: Option<PathBuf>,
    /// Run with console logging instead of rotating log files
    #[arg(long)]
    foreground: bool,
    /// Also listen for JSON-RPC over TCP on 127.0.0.1:<port>
    #[arg(long)]
    tcp_port: Option<u16>,
  },
  /// Index a project once and exit, without starting the daemon.
  Index {
    /// Project root (default: current directory)
    #[arg(long)]
    root: Option<PathBuf>,
  },
  /// Search the chunk store.
  Search {
    #[command(subcommand)]
    command: SearchCommand,
  },
  /// Print Chunk Store statistics.
  Stats {
    #[arg(long)]
    root: Option<PathBuf>,
    #[arg(long)]
    json: bool,
  },
  /// Check that the chunk store is reachable.
  Health {
    #[arg(long)]
    root: Option<PathBuf>,
  },
  /// Generate shell completions.
  Completions { shell: Shell },
}

#[derive(Subcommand)]
enum SearchCommand {
  /// Regex search over chunk source text.
  Regex {
    pattern: String,
    #[arg(long)]
    root: Option<PathBuf>,
    #[arg(long, default_value = "20")]
    limit: u32,
    #[arg(long, default_value = "0")]
    offset: u32,
    #[arg(long)]
    language: Option<String>,
    #[arg(long)]
    path_prefix: Option<String>,
    #[arg(long)]
    json: bool,
  },
  /// Semantic (vector) search over chunk embeddings.
  Semantic {
    query: String,
    #[arg(long)]
    root: Option<PathBuf>,
    #[arg(long)]
    provider: Option<String>,
    #[arg(long, default_value = "20")]
    limit: u32,
    #[arg(long, default_value = "0")]
    offset: u32,
    #[arg(long)]
    language: Option<String>,
    #[arg(long)]
    path_prefix: Option<String>,
    #[arg(long)]
    json: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  match cli.command {
    Commands::Serve { root, foreground, tcp_port } => cmd_serve(root, foreground, tcp_port).await,
    Commands::Index { root } => {
      init_cli_logging();
      cmd_index(root).await
    }
    Commands::Search { command } => {
      init_cli_logging();
      match command {
        SearchCommand::Regex {
          pattern,
          root,
          limit,
          offset,
          language,
          path_prefix,
          json,
        } => cmd_search_regex(root, pattern, limit, offset, language, path_prefix, json).await,
        SearchCommand::Semantic {
          query,
          root,
          provider,
          limit,
          offset,
          language,
          path_prefix,
          json,
        } => cmd_search_semantic(root, query, provider, limit, offset, language, path_prefix, json).await,
      }
    }
    Commands::Stats { root, json } => {
      init_cli_logging();
      cmd_stats(root, json).await
    }
    Commands::Health { root } => {
      init_cli_logging();
      cmd_health(root).await
    }
    Commands::Completions { shell } => {
      let mut cmd = Cli::command();
      let name = cmd.get_name().to_string();
      clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
      Ok(())
    }
  }
}
