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

//! Rothko server
//!
//! Wires the storage engine, the aggregation writer, the dumper, the
//! Graphite listeners and the HTTP API into one process.
//!
//! ```text
//!  graphite ──► Writer ──(every main.duration)──► Dumper ──► Engine (own thread)
//!                                                              ▲
//!  HTTP /api/render, /api/query ───────────────────────────────┘
//! ```
//!
//! Shutdown: the caller cancels the token, listeners and the HTTP server
//! drain, the writer is flushed one last time, then the engine stops.

pub mod api;
pub mod config;
pub mod listener;

use std::sync::Arc;

use anyhow::{Context, Result};
use rothko_query::{Dumper, Writer};
use rothko_storage::Engine;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use api::{AppState, IndexPage};
use config::{parse_listen_addr, RothkoConfig};
use listener::GraphiteListener;

const DEFAULT_FILTER: &str = "rothko_server=info,rothko_storage=info,rothko_query=info,tower_http=info";

/// Install the global subscriber. `RUST_LOG` overrides the default filter,
/// `ROTHKO_LOG_JSON=1` switches to JSON lines.
pub fn init_tracing() {
    let json = std::env::var("ROTHKO_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(fmt_layer)
        .init();
}

/// Run until `token` is cancelled.
pub async fn run_server(config: RothkoConfig, token: CancellationToken) -> Result<()> {
    config.validate()?;
    tracing::info!("Starting Rothko");
    tracing::debug!("Configuration: {:#?}", config);

    let engine = Arc::new(
        Engine::new(&config.database.files.directory, config.engine_options())
            .context("opening storage engine")?,
    );
    let writer = Arc::new(Writer::new(config.sketch_params()));
    let dumper = Dumper::new(writer.clone(), engine.clone(), config.main.duration);

    // the engine outlives everything that feeds it
    let engine_token = CancellationToken::new();
    let engine_thread = {
        let engine = engine.clone();
        let engine_token = engine_token.clone();
        std::thread::Builder::new()
            .name("rothko-engine".to_string())
            .spawn(move || engine.run(engine_token))
            .context("spawning engine thread")?
    };

    let mut tasks = tokio::task::JoinSet::new();
    for graphite in &config.listeners.graphite {
        let addr = parse_listen_addr(&graphite.address)?;
        let listener = GraphiteListener::bind(addr).await?;
        tasks.spawn(listener.run(writer.clone(), token.clone()));
    }
    {
        let dumper = dumper.clone();
        let token = token.clone();
        tasks.spawn(async move {
            dumper.run(token).await;
            Ok::<(), anyhow::Error>(())
        });
    }

    let reload = std::env::var_os("ROTHKO_DEV").is_some();
    let index = IndexPage::load(config.api.index.clone(), reload)?;
    let mut state = AppState::new(engine.clone(), token.clone())
        .with_index(index)
        .with_dumper(dumper.clone());
    if let Some(security) = &config.api.security {
        state = state.with_credentials(&security.username, &security.password);
    }
    let app = api::router(state, &config.api)?;

    let addr = config.api_addr()?;
    let http = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding http on {}", addr))?;
    tracing::info!("Listening on http://{}", addr);

    let served = axum::serve(http, app)
        .with_graceful_shutdown(token.clone().cancelled_owned())
        .await;
    if let Err(e) = &served {
        tracing::error!("HTTP server error: {}", e);
        token.cancel();
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task failed: {:#}", e),
            Err(e) => tracing::error!("task panicked: {}", e),
        }
    }

    // flush what was aggregated since the last dump, then stop the engine
    let final_dump = {
        let dumper = dumper.clone();
        let engine_token = engine_token.clone();
        tokio::task::spawn_blocking(move || dumper.dump_once(&engine_token)).await?
    };
    tracing::info!(writes = final_dump.writes, "final dump complete");

    engine_token.cancel();
    tokio::task::spawn_blocking(move || engine_thread.join())
        .await?
        .map_err(|_| anyhow::anyhow!("engine thread panicked"))??;

    tracing::info!("Rothko stopped");
    served.context("http server")
}
