// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rothko_core::{Record, RothkoError};
use rothko_query::Search;
use rothko_server::{config::RothkoConfig, init_tracing, run_server};
use rothko_storage::Engine;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "rothko")]
#[command(author, version, about = "Rothko - a time-distribution metric store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the server (default)
    Run {
        /// Path to configuration file (TOML)
        #[arg(short, long, env = "ROTHKO_CONFIG")]
        config: Option<PathBuf>,

        /// HTTP listen address (overrides config file)
        #[arg(long)]
        address: Option<String>,

        /// Data directory path (overrides config file)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Write a starter configuration file
    Init {
        #[arg(default_value = "rothko.toml")]
        path: PathBuf,
    },

    /// List stored metric names
    Metrics {
        #[arg(short, long, env = "ROTHKO_CONFIG")]
        config: Option<PathBuf>,

        /// Space separated glob terms
        #[arg(short, long)]
        query: Option<String>,

        /// Maximum names printed
        #[arg(long, default_value = "100")]
        results: usize,
    },

    /// Print the stored records of a metric, newest first
    DumpMetric {
        metric: String,

        #[arg(short, long, env = "ROTHKO_CONFIG")]
        config: Option<PathBuf>,

        /// Maximum records printed
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command.unwrap_or(Commands::Run {
        config: None,
        address: None,
        data_dir: None,
    }) {
        Commands::Run {
            config,
            address,
            data_dir,
        } => {
            let mut config = RothkoConfig::load(config)?;
            if let Some(addr) = address {
                config.api.address = addr;
            }
            if let Some(dir) = data_dir {
                config.database.files.directory = dir;
            }

            let token = CancellationToken::new();
            {
                let token = token.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!("interrupt received, shutting down");
                    }
                    token.cancel();
                });
            }
            run_server(config, token).await
        }

        Commands::Init { path } => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            std::fs::write(&path, RothkoConfig::initial())
                .with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
            Ok(())
        }

        Commands::Metrics {
            config,
            query,
            results,
        } => {
            let config = RothkoConfig::load(config)?;
            let engine = Engine::new(&config.database.files.directory, config.engine_options())?;
            engine.populate_metrics(&CancellationToken::new())?;

            let mut search = Search::new(query.as_deref().unwrap_or("*"), results);
            engine.metrics(|name| search.add(name));
            for name in search.matched() {
                println!("{}", name);
            }
            Ok(())
        }

        Commands::DumpMetric {
            metric,
            config,
            limit,
        } => {
            let config = RothkoConfig::load(config)?;
            let engine = Engine::new(&config.database.files.directory, config.engine_options())?;

            println!("start\tend\tobservations\tmin\tmax\tkind\tmerged");
            let mut printed = 0usize;
            let mut scratch = Vec::new();
            engine.query(
                &CancellationToken::new(),
                &metric,
                i64::MAX,
                &mut scratch,
                |start, end, data| {
                    let rec = Record::from_bytes(data)?;
                    println!(
                        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                        start,
                        end,
                        rec.observations,
                        rec.min,
                        rec.max,
                        rec.kind,
                        rec.merged_count()
                    );
                    printed += 1;
                    Ok::<bool, RothkoError>(printed < limit)
                },
            )?;
            Ok(())
        }
    }
}
