//! # LogWriter: run progress through `tracing`
//!
//! Renders every [`Progress`] event as one structured log line. Failures are
//! logged at `warn`, everything else at `info` (metadata at `debug`).
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  run started stages=3
//! INFO  stage started stage=0 stage_id="web" kind="fan_out"
//! INFO  job dispatched stage=0 job="20231001120000123456" targets=2
//! WARN  resource failed stage=0 target="web-2" resource="pkg_|-install_|-nginx_|-installed" comment="not found"
//! WARN  stage finished stage=0 stage_id="web" outcome="Complete" reason=...
//! INFO  run finished overall="PartialFailure" stages=3
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::Observe;
use crate::progress::{Progress, ProgressKind};

/// Progress observer that writes to the `tracing` pipeline.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observe for LogWriter {
    async fn on_progress(&self, p: &Progress) {
        let stage_id = p.stage_id.as_deref().unwrap_or("-");
        match p.kind {
            ProgressKind::RunStarted => {
                info!(stages = ?p.count, "run started");
            }
            ProgressKind::RunFinished => {
                info!(overall = ?p.detail, stages = ?p.count, "run finished");
            }
            ProgressKind::StageStarted => {
                info!(stage = ?p.stage, stage_id, kind = ?p.detail, "stage started");
            }
            ProgressKind::StageSkipped => {
                info!(stage = ?p.stage, stage_id, "stage excluded");
            }
            ProgressKind::StageFinished => match &p.reason {
                Some(reason) => {
                    warn!(stage = ?p.stage, stage_id, outcome = ?p.detail, %reason, "stage finished");
                }
                None => {
                    info!(stage = ?p.stage, stage_id, outcome = ?p.detail, "stage finished");
                }
            },
            ProgressKind::JobDispatched => {
                info!(stage = ?p.stage, job = ?p.job, targets = ?p.count, "job dispatched");
            }
            ProgressKind::TargetReturned => {
                if p.is_failure() {
                    warn!(stage = ?p.stage, job = ?p.job, target = ?p.target, "target returned with failures");
                } else {
                    info!(stage = ?p.stage, job = ?p.job, target = ?p.target, "target returned");
                }
            }
            ProgressKind::ResourceFailed => {
                warn!(
                    stage = ?p.stage,
                    target = ?p.target,
                    resource = ?p.detail,
                    comment = ?p.reason,
                    "resource failed"
                );
            }
            ProgressKind::MetadataReported => {
                debug!(stage = ?p.stage, entry = ?p.detail, "stage metadata");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
