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

//! Background report jobs
//!
//! Excel exports and emailed charts are enqueued on a bounded tokio channel
//! and acknowledged immediately. One dispatcher task drains the channel and
//! spawns a task per job. Jobs cannot be cancelled once enqueued, and a
//! failing job is logged and dropped, never retried.

use anyhow::{anyhow, Context, Result};
use retailpivot_query::AnalyticsEngine;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::mail::{DynMailer, EmailMessage, MailAttachment};
use crate::report::{render_chart, write_workbook, HTML_CONTENT_TYPE, XLSX_CONTENT_TYPE};
use crate::validation::{validate_request, AnalyticsRequest};

pub const EXCEL_ATTACHMENT: &str = "analytics_report.xlsx";
pub const CHART_ATTACHMENT: &str = "analytics_report.html";

/// A queued report; the raw payload is validated again when the job runs
#[derive(Debug, Clone)]
pub enum ReportJob {
    Excel { payload: serde_json::Value },
    Chart { payload: serde_json::Value },
}

impl ReportJob {
    pub fn kind(&self) -> &'static str {
        match self {
            ReportJob::Excel { .. } => "excel",
            ReportJob::Chart { .. } => "chart",
        }
    }

    fn payload(&self) -> &serde_json::Value {
        match self {
            ReportJob::Excel { payload } | ReportJob::Chart { payload } => payload,
        }
    }
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Report queue is full")]
    QueueFull,

    #[error("Report queue is closed")]
    Closed,
}

/// Job counters
#[derive(Debug, Default)]
pub struct JobStats {
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStatsSnapshot {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
}

impl JobStats {
    pub fn snapshot(&self) -> JobStatsSnapshot {
        JobStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// What a job needs to run
#[derive(Clone)]
pub struct JobContext {
    pub engine: AnalyticsEngine,
    pub mailer: DynMailer,
}

/// Sending side of the report queue
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<ReportJob>,
    stats: Arc<JobStats>,
}

impl JobQueue {
    /// Create the queue and spawn its dispatcher on the current runtime
    pub fn start(context: JobContext, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(JobStats::default());
        let handle = tokio::spawn(dispatch(receiver, context, stats.clone()));
        (Self { sender, stats }, handle)
    }

    pub fn enqueue(&self, job: ReportJob) -> Result<(), JobError> {
        let kind = job.kind();
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => JobError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => JobError::Closed,
        })?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        debug!(kind, "Report job enqueued");
        Ok(())
    }

    pub fn stats(&self) -> JobStatsSnapshot {
        self.stats.snapshot()
    }
}

async fn dispatch(mut receiver: mpsc::Receiver<ReportJob>, context: JobContext, stats: Arc<JobStats>) {
    while let Some(job) = receiver.recv().await {
        let context = context.clone();
        let stats = stats.clone();
        tokio::spawn(async move {
            let kind = job.kind();
            match run_job(&context, job).await {
                Ok(()) => {
                    stats.completed.fetch_add(1, Ordering::Relaxed);
                    info!(kind, "Report job finished");
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    error!(kind, "Report job failed: {:#}", e);
                }
            }
        });
    }
    debug!("Report queue closed, dispatcher exiting");
}

fn recipient(request: &AnalyticsRequest) -> Result<String> {
    request
        .email
        .clone()
        .ok_or_else(|| anyhow!("report job has no recipient"))
}

/// Run one job to completion: query, render, mail
pub async fn run_job(context: &JobContext, job: ReportJob) -> Result<()> {
    let request = validate_request(job.payload()).map_err(|e| anyhow!("invalid payload: {}", e))?;
    let to = recipient(&request)?;
    let engine = context.engine.clone();
    let query = request.query.clone();

    let message = match job {
        ReportJob::Excel { .. } => {
            let report = tokio::task::spawn_blocking(move || engine.run_report(&query))
                .await
                .context("report task panicked")??;
            let workbook = write_workbook(&report)?;
            EmailMessage {
                to,
                subject: "Analytics report".to_string(),
                body_text: "Your Excel report is ready. The file is attached to this email."
                    .to_string(),
                attachments: vec![MailAttachment {
                    filename: EXCEL_ATTACHMENT.to_string(),
                    content_type: XLSX_CONTENT_TYPE.to_string(),
                    body: workbook,
                }],
            }
        }
        ReportJob::Chart { .. } => {
            let table = tokio::task::spawn_blocking(move || engine.run_query(&query, false))
                .await
                .context("chart task panicked")??;
            let html = render_chart(&table, request.chart_type)?;
            EmailMessage {
                to,
                subject: format!("Analytics report ({})", request.chart_type),
                body_text: "Your report has been generated. The chart is attached.".to_string(),
                attachments: vec![MailAttachment {
                    filename: CHART_ATTACHMENT.to_string(),
                    content_type: HTML_CONTENT_TYPE.to_string(),
                    body: html.into_bytes(),
                }],
            }
        }
    };

    context.mailer.send(message).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::LogMailer;
    use retailpivot_query::AnalyticsCache;
    use retailpivot_storage::InMemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn context(mailer: Arc<LogMailer>) -> JobContext {
        let engine = AnalyticsEngine::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(AnalyticsCache::default()),
            Duration::from_secs(60),
        );
        JobContext { engine, mailer }
    }

    fn payload(render_type: &str) -> serde_json::Value {
        json!({
            "metrics": ["turnover"],
            "group_by": ["shop_name"],
            "date_range": {"from_date": "2024-03-01", "to_date": "2024-03-31"},
            "total": true,
            "render_type": render_type,
            "chart_type": "Line Chart",
            "email": "analyst@example.com"
        })
    }

    #[tokio::test]
    async fn test_excel_job_mails_workbook() {
        let mailer = Arc::new(LogMailer::new());
        run_job(&context(mailer.clone()), ReportJob::Excel { payload: payload("excel") })
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "analyst@example.com");
        assert_eq!(sent[0].subject, "Analytics report");
        assert_eq!(sent[0].attachments[0].filename, EXCEL_ATTACHMENT);
        // xlsx is a zip archive
        assert!(sent[0].attachments[0].body.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn test_chart_job_mails_html() {
        let mailer = Arc::new(LogMailer::new());
        run_job(&context(mailer.clone()), ReportJob::Chart { payload: payload("chart") })
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent[0].subject, "Analytics report (Line Chart)");
        assert_eq!(sent[0].attachments[0].filename, CHART_ATTACHMENT);
        assert_eq!(sent[0].attachments[0].content_type, "text/html");
    }

    #[tokio::test]
    async fn test_invalid_payload_fails() {
        let mailer = Arc::new(LogMailer::new());
        let result = run_job(
            &context(mailer.clone()),
            ReportJob::Excel { payload: json!({"metrics": ["turnover_diff"]}) },
        )
        .await;
        assert!(result.is_err());
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_queue_dispatches() {
        let mailer = Arc::new(LogMailer::new());
        let (queue, _handle) = JobQueue::start(context(mailer.clone()), 4);
        queue.enqueue(ReportJob::Chart { payload: payload("chart") }).unwrap();

        for _ in 0..100 {
            if queue.stats().completed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(
            queue.stats(),
            JobStatsSnapshot { enqueued: 1, completed: 1, failed: 0 }
        );
        assert_eq!(mailer.sent().len(), 1);
    }
}
