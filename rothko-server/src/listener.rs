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

//! Graphite plaintext listener
//!
//! One metric per line: `<metric> <value> <timestamp>`, fields separated by
//! single spaces. The timestamp is ignored; values are aggregated into the
//! current interval.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rothko_query::Writer;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A malformed line.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LineError {
    #[error("bad number of fields: {0}")]
    Fields(usize),

    #[error("invalid value {0:?}")]
    Value(String),
}

/// Split a line into its metric and value.
pub fn parse_line(line: &str) -> Result<(&str, f64), LineError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let fields: Vec<&str> = line.split(' ').collect();
    if fields.len() != 3 {
        return Err(LineError::Fields(fields.len()));
    }
    let value = fields[1]
        .parse::<f64>()
        .map_err(|_| LineError::Value(fields[1].to_string()))?;
    Ok((fields[0], value))
}

pub struct GraphiteListener {
    listener: TcpListener,
}

impl GraphiteListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding graphite listener on {}", addr))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `token` is cancelled, then wait for every
    /// connection to close.
    pub async fn run(self, writer: Arc<Writer>, token: CancellationToken) -> Result<()> {
        info!(address = %self.local_addr()?, "graphite listener started");
        let mut conns = JoinSet::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.context("accepting graphite connection")?;
                    debug!(peer = %peer, "graphite connection");
                    let writer = writer.clone();
                    let token = token.clone();
                    conns.spawn(async move {
                        if let Err(e) = handle_conn(stream, peer, writer, token).await {
                            warn!(peer = %peer, error = %e, "graphite connection error");
                        }
                    });
                }
                // reap finished connections so the set stays small
                Some(_) = conns.join_next(), if !conns.is_empty() => {}
            }
        }

        while conns.join_next().await.is_some() {}
        info!("graphite listener stopped");
        Ok(())
    }
}

async fn handle_conn(
    stream: TcpStream,
    peer: SocketAddr,
    writer: Arc<Writer>,
    token: CancellationToken,
) -> std::io::Result<()> {
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };

        match parse_line(&line) {
            Ok((metric, value)) => writer.observe(metric, value, None),
            Err(e) => warn!(peer = %peer, line = %line, error = %e, "invalid graphite line"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("foo.bar 1.5 1500000000"), Ok(("foo.bar", 1.5)));
        assert_eq!(parse_line("foo -2 0\r"), Ok(("foo", -2.0)));
        assert_eq!(parse_line("foo 1"), Err(LineError::Fields(2)));
        assert_eq!(parse_line("foo  1 2"), Err(LineError::Fields(4)));
        assert_eq!(parse_line(""), Err(LineError::Fields(1)));
        assert_eq!(
            parse_line("foo abc 0"),
            Err(LineError::Value("abc".to_string()))
        );
    }

    #[tokio::test]
    async fn test_lines_reach_writer() {
        let writer = Arc::new(Writer::default());
        let token = CancellationToken::new();
        let listener = GraphiteListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(listener.run(writer.clone(), token.clone()));

        let mut conn = TcpStream::connect(addr).await.unwrap();
        conn.write_all(b"a.b 1 0\nbroken line\na.b 3 0\nc 7 0\n")
            .await
            .unwrap();
        conn.shutdown().await.unwrap();

        let mut waited = 0;
        while writer.pending().map(|p| p.1).unwrap_or(0) < 2 && waited < 200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }
        // give the last line time to land in its aggregator
        tokio::time::sleep(Duration::from_millis(50)).await;

        token.cancel();
        task.await.unwrap().unwrap();

        let mut seen = HashMap::new();
        writer.capture(|metric, record| {
            seen.insert(metric.to_string(), (record.observations, record.min, record.max));
            true
        });
        assert_eq!(seen["a.b"], (2, 1.0, 3.0));
        assert_eq!(seen["c"], (1, 7.0, 7.0));
    }
}
