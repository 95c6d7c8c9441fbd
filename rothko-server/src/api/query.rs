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

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use rothko_query::Search;

use crate::api::{ApiError, AppState};

const DEFAULT_RESULTS: usize = 10;

/// GET /api/query?query=<terms>&results=<n>
///
/// Metric names matching every space separated term, in name order, at most
/// `results` of them.
pub async fn query(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let query = params
        .get("query")
        .map(String::as_str)
        .unwrap_or_default();
    if query.trim().is_empty() {
        return Err(ApiError::BadRequest("query required".to_string()));
    }
    let results = params
        .get("results")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_RESULTS);

    let mut search = Search::new(query, results);
    state.engine.metrics(|name| search.add(name));
    Ok(Json(search.into_matched()))
}
