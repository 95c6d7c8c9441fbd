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

//! GET /api/render
//!
//! Scans a metric newest first from `now`, merging records into one column
//! per run of pixels until a record ends before the window. Colours come
//! from the CDF of the newest record, so a value keeps its colour across
//! every column.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use rothko_core::{unix_nanos, Record, RothkoResult, Sketch};
use rothko_query::{Canvas, Column, Heatmap, Merger, MergerOptions, VIRIDIS};
use serde::Serialize;
use tracing::debug;

use crate::api::{ApiError, AppState};

const DEFAULT_WIDTH: usize = 1000;
const DEFAULT_HEIGHT: usize = 360;
const DEFAULT_DURATION: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_SAMPLES: usize = 30;
const DEFAULT_COMPRESSION: f64 = 5.0;

/// Parsed render parameters. Unparsable values fall back to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    pub metric: String,
    pub width: usize,
    pub height: usize,
    pub padding: usize,
    pub now: i64,
    pub duration: Duration,
    pub samples: usize,
    pub compression: f64,
}

impl RenderParams {
    pub fn from_query(params: &HashMap<String, String>, now: i64) -> Result<Self, ApiError> {
        let metric = params.get("metric").cloned().unwrap_or_default();
        if metric.is_empty() {
            return Err(ApiError::BadRequest("metric required".to_string()));
        }

        let out = Self {
            metric,
            width: param(params, "width", DEFAULT_WIDTH),
            height: param(params, "height", DEFAULT_HEIGHT),
            padding: param(params, "padding", 0),
            now: param(params, "now", now),
            duration: params
                .get("duration")
                .and_then(|d| humantime::parse_duration(d).ok())
                .unwrap_or(DEFAULT_DURATION),
            samples: param(params, "samples", DEFAULT_SAMPLES),
            compression: param(params, "compression", DEFAULT_COMPRESSION),
        };

        if out.width < 1 {
            return Err(ApiError::BadRequest("width must be at least 1".to_string()));
        }
        if out.height < 2 {
            return Err(ApiError::BadRequest("height must be at least 2".to_string()));
        }
        Ok(out)
    }

    fn duration_nanos(&self) -> i64 {
        i64::try_from(self.duration.as_nanos()).unwrap_or(i64::MAX)
    }
}

fn param<T: FromStr>(params: &HashMap<String, String>, key: &str, default: T) -> T {
    params
        .get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Columns plus what a frontend needs to draw axes around them.
#[derive(Debug, Clone, Serialize)]
pub struct RenderResponse {
    pub metric: String,
    pub columns: Vec<Column>,
    /// Hex of the newest stored record in the window, if any.
    pub earliest: Option<String>,
    pub now: i64,
    pub duration: i64,
    pub width: usize,
    pub height: usize,
    pub padding: usize,
}

struct Rendered {
    columns: Vec<Column>,
    earliest: Option<Vec<u8>>,
    reference: Option<Sketch>,
}

/// Query and merge. Runs on a blocking thread.
fn collect(state: &AppState, params: &RenderParams) -> RothkoResult<Rendered> {
    let mut merger = Merger::new(MergerOptions {
        width: params.width,
        now: params.now,
        duration: params.duration_nanos(),
        samples: params.samples,
        compression: params.compression,
    })?;
    let stop_before = params.now.saturating_sub(params.duration_nanos());

    let mut earliest: Option<Vec<u8>> = None;
    let mut reference: Option<Sketch> = None;
    let mut scratch = Vec::new();
    let mut scanned = 0usize;

    state.engine.query(
        &state.token,
        &params.metric,
        params.now,
        &mut scratch,
        |_, end, data| {
            let record = Record::from_bytes(data)?;
            if earliest.is_none() {
                reference = Some(Sketch::load(&record.kind, &record.distribution)?);
                earliest = Some(data.to_vec());
            }
            merger.push(record)?;
            scanned += 1;
            Ok(end >= stop_before)
        },
    )?;

    let columns = merger.finish()?;
    debug!(metric = %params.metric, scanned, columns = columns.len(), "rendered columns");
    Ok(Rendered {
        columns,
        earliest,
        reference,
    })
}

fn draw(params: &RenderParams, rendered: Rendered) -> RothkoResult<Vec<u8>> {
    let mut canvas = Canvas::new(params.width, params.height);
    if let Some(mut reference) = rendered.reference {
        Heatmap::new(&VIRIDIS, |v| reference.cdf(v))?.draw_all(&mut canvas, &rendered.columns);
    }
    canvas.to_png()
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|part| part.trim() == "application/json"))
        .unwrap_or(false)
}

/// GET /api/render?metric=..&width=..&height=..&now=..&duration=..
pub async fn render(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let params = RenderParams::from_query(&query, unix_nanos())?;
    let json = wants_json(&headers);

    let result = tokio::task::spawn_blocking(move || -> RothkoResult<Response> {
        let rendered = collect(&state, &params)?;
        if json {
            let body = RenderResponse {
                metric: params.metric.clone(),
                columns: rendered.columns,
                earliest: rendered.earliest.map(hex::encode),
                now: params.now,
                duration: params.duration_nanos(),
                width: params.width,
                height: params.height,
                padding: params.padding,
            };
            Ok(Json(body).into_response())
        } else {
            let png = draw(&params, rendered)?;
            Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
        }
    })
    .await
    .map_err(|e| ApiError::Internal(format!("render task: {}", e)))?;

    result.map_err(ApiError::from)
}
