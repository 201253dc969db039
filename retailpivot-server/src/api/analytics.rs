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

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use retailpivot_query::{registry, Catalog};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{ApiError, AppState};
use crate::jobs::ReportJob;
use crate::report::render_chart;
use crate::validation::{validate_request, RenderType};

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub message: String,
}

/// GET /api/analytics/catalog/
pub async fn get_catalog() -> Json<Catalog> {
    Json(registry().catalog())
}

/// POST /api/analytics/get-analytics/
///
/// JSON and charts without an email are answered inline. Excel exports and
/// emailed charts are queued and acknowledged with 202.
pub async fn get_analytics(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    let request = validate_request(&payload)?;
    debug!(
        render_type = ?request.render_type,
        metrics = ?request.query.metrics,
        group_by = ?request.query.dimensions,
        "Analytics request"
    );

    if request.is_async() {
        let to = request.email.clone().unwrap_or_default();
        let job = match request.render_type {
            RenderType::Excel => ReportJob::Excel { payload },
            _ => ReportJob::Chart { payload },
        };
        let kind = job.kind();
        state.jobs.enqueue(job)?;
        info!(kind, to = %to, "Report queued");

        let message = match kind {
            "excel" => format!("Excel report is being generated and will be sent to {}", to),
            _ => format!("Chart is being generated and will be sent to {}", to),
        };
        return Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { message })).into_response());
    }

    let engine = state.engine.clone();
    let query = request.query;
    match request.render_type {
        RenderType::Chart => {
            let table = tokio::task::spawn_blocking(move || engine.run_query(&query, false)).await??;
            let html = render_chart(&table, request.chart_type)
                .map_err(|e| ApiError::Internal(format!("Failed to render chart: {:#}", e)))?;
            Ok(Html(html).into_response())
        }
        _ => {
            let report = tokio::task::spawn_blocking(move || engine.run_report(&query)).await??;
            Ok(Json(report).into_response())
        }
    }
}
