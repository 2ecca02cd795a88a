use crate::client::{QueueOutcome, ScanClient, ScanRequest};

use super::log::RunLog;
use super::pending::PendingSet;
use super::verdict::Verdict;
use super::RunEnd;

/// Result of submitting every selected plugin.
#[derive(Debug)]
pub struct QueueReport {
    /// Plugins that still need a terminal result.
    pub pending: PendingSet,
    /// Lowest verdict the run can still end with.
    pub verdict: Verdict,
    /// Outcome per answered submission, in submission order.
    pub submissions: Vec<(String, QueueOutcome)>,
    /// Plugin whose submission failed with an API error, and the error.
    pub failed: Option<(String, String)>,
    /// Set when queueing ended the run.
    pub end: Option<RunEnd>,
}

/// Submits one scan per plugin, in order, and stops at the first API error.
pub struct QueueStage<'a, C: ScanClient> {
    client: &'a C,
}

impl<'a, C: ScanClient> QueueStage<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub fn run(&self, target: &str, plugins: &[String], log: &mut RunLog) -> QueueReport {
        let mut pending: PendingSet = plugins.iter().cloned().collect();
        let mut verdict = Verdict::Success;
        let mut submissions = Vec::with_capacity(plugins.len());

        for plugin in plugins {
            let request = ScanRequest::new(target, plugin.as_str());
            let outcome = match self.client.queue(&request) {
                Ok(outcome) => outcome,
                Err(e) => {
                    verdict.raise(Verdict::Failure);
                    log.line(format_args!("Failed to queue a scan for {plugin}"));
                    log.line(format_args!("  {e}"));
                    tracing::error!(target_name = %target, %plugin, error = %e, "queue request failed");
                    return QueueReport {
                        pending,
                        verdict,
                        submissions,
                        failed: Some((plugin.clone(), e.to_string())),
                        end: Some(RunEnd::QueueError),
                    };
                }
            };
            submissions.push((plugin.clone(), outcome));

            match outcome {
                QueueOutcome::Success => {
                    log.line(format_args!("Queued a scan for {plugin}"));
                }
                QueueOutcome::Skipped => {
                    pending.remove(plugin);
                    verdict.raise(Verdict::Unstable);
                    log.line(format_args!(
                        "Skipping {plugin}: billing is not configured or a scan is already running"
                    ));
                }
                // The plugin stays pending; only a skip drops it from tracking.
                QueueOutcome::Failed | QueueOutcome::Undefined => {
                    verdict.raise(Verdict::Failure);
                    log.line(format_args!("Failed to register {plugin} in the scan queue"));
                }
            }
            tracing::info!(target_name = %target, %plugin, %outcome, "scan submitted");
        }

        QueueReport {
            pending,
            verdict,
            submissions,
            failed: None,
            end: None,
        }
    }
}
