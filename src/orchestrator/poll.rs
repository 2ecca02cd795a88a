use std::time::Duration;

use serde::Serialize;

use crate::client::{ResultStatus, ScanClient, ScanResult};
use crate::error::ApiError;

use super::cancel::CancelToken;
use super::log::RunLog;
use super::pending::PendingSet;
use super::verdict::{judge_color, Verdict};
use super::RunEnd;

const PROGRESS_EVERY: Duration = Duration::from_secs(60);

/// Timing and judgement knobs for the polling loop.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub unstable_preferred: bool,
}

impl PollSettings {
    /// Iterations between progress markers, roughly one per minute.
    pub fn progress_cadence(&self) -> u64 {
        if self.interval.is_zero() {
            return 1;
        }
        let ratio = PROGRESS_EVERY.as_secs_f64() / self.interval.as_secs_f64();
        (ratio.ceil() as u64).max(1)
    }
}

/// A plugin whose scan reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub plugin: String,
    pub scan: ScanResult,
    pub verdict: Verdict,
}

#[derive(Debug)]
pub struct PollReport {
    pub verdict: Verdict,
    pub resolved: Vec<Resolution>,
    pub cycles: u64,
    pub end: RunEnd,
}

/// Fetches target status until nothing is pending or the run has to stop.
pub struct PollStage<'a, C: ScanClient> {
    client: &'a C,
    settings: &'a PollSettings,
    cancel: &'a CancelToken,
}

impl<'a, C: ScanClient> PollStage<'a, C> {
    pub fn new(client: &'a C, settings: &'a PollSettings, cancel: &'a CancelToken) -> Self {
        Self {
            client,
            settings,
            cancel,
        }
    }

    pub fn run(
        &self,
        target: &str,
        mut pending: PendingSet,
        floor: Verdict,
        log: &mut RunLog,
    ) -> PollReport {
        let mut report = PollReport {
            verdict: floor,
            resolved: Vec::new(),
            cycles: 0,
            end: RunEnd::Completed,
        };
        let cadence = self.settings.progress_cadence();

        while !pending.is_empty() {
            if report.cycles % cadence == 0 {
                log.line(".");
            }
            report.cycles += 1;

            let statuses = match self.client.fetch_target_status(target) {
                Ok(statuses) => statuses,
                Err(e) => {
                    report.verdict.raise(Verdict::Failure);
                    log.line("Unexpected response while polling for scan results");
                    log.line(format_args!("  {e}"));
                    tracing::error!(target_name = %target, error = %e, "status fetch failed");
                    report.end = RunEnd::PollError;
                    return report;
                }
            };

            for status in statuses {
                if status.is_queued || !pending.remove(&status.name) {
                    continue;
                }
                let Some(scan) = status.scan else {
                    let e = ApiError::Malformed(format!(
                        "{} finished without a scan result",
                        status.name
                    ));
                    report.verdict.raise(Verdict::Failure);
                    log.line(format_args!("Could not read the result of {}", status.name));
                    log.line(format_args!("  {e}"));
                    tracing::error!(target_name = %target, plugin = %status.name, error = %e, "missing scan result");
                    report.end = RunEnd::PollError;
                    return report;
                };

                if scan.result_status != ResultStatus::Ok {
                    report.verdict.raise(Verdict::Failure);
                    log.line(format_args!(
                        "The {} scan was aborted. See the details at:",
                        status.name
                    ));
                    log.line(&scan.result_url);
                    tracing::warn!(target_name = %target, plugin = %status.name, "scan aborted");
                    report.resolved.push(Resolution {
                        plugin: status.name,
                        scan,
                        verdict: Verdict::Failure,
                    });
                    report.end = RunEnd::ScanAborted;
                    return report;
                }

                let verdict = judge_color(&scan.status_color, self.settings.unstable_preferred);
                report.verdict.raise(verdict);
                log.line(format_args!(
                    "The {} scan finished. Result: {} Message: {}",
                    status.name, scan.status, scan.message
                ));
                log.line(&scan.result_url);
                tracing::info!(
                    target_name = %target,
                    plugin = %status.name,
                    color = %scan.status_color,
                    %verdict,
                    "scan finished"
                );
                report.resolved.push(Resolution {
                    plugin: status.name,
                    scan,
                    verdict,
                });
            }

            if pending.is_empty() {
                break;
            }

            if self.cancel.wait(self.settings.interval) {
                report.verdict.raise(Verdict::Aborted);
                log.line(
                    "Stopped polling for results. Cancel the running scans from the Walti.io target page",
                );
                tracing::warn!(
                    target_name = %target,
                    pending = ?pending.names(),
                    "polling cancelled"
                );
                report.end = RunEnd::Cancelled;
                return report;
            }
        }

        report
    }
}
