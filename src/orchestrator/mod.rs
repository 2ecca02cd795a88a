//! Queue, wait, judge: the scan state machine behind one pipeline run.
//!
//! [`Orchestrator::run`] submits every selected plugin ([`queue`]), then
//! polls the target until each queued plugin reaches a terminal result
//! ([`poll`]), folding everything into a single [`Verdict`].

pub mod cancel;
pub mod log;
pub mod pending;
pub mod poll;
pub mod queue;
pub mod verdict;

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::client::{QueueOutcome, ScanClient, ScanResult};
use crate::config::Config;

pub use cancel::CancelToken;
pub use log::RunLog;
pub use pending::PendingSet;
pub use poll::{PollSettings, PollStage, Resolution};
pub use queue::{QueueReport, QueueStage};
pub use verdict::{combine, judge_color, Verdict};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEnd {
    /// Every queued plugin reached a terminal result.
    Completed,
    /// Nothing was left to wait for after queueing.
    AllSkipped,
    /// Waiting for results was turned off.
    NoWait,
    QueueError,
    PollError,
    ScanAborted,
    Cancelled,
}

impl std::fmt::Display for RunEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::AllSkipped => write!(f, "all submissions skipped"),
            Self::NoWait => write!(f, "not waiting for results"),
            Self::QueueError => write!(f, "queue request failed"),
            Self::PollError => write!(f, "status polling failed"),
            Self::ScanAborted => write!(f, "scan aborted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-run behavior, fixed when the orchestrator is built.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub no_wait: bool,
    pub unstable_preferred: bool,
    pub poll_interval: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            no_wait: false,
            unstable_preferred: false,
            poll_interval: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for RunSettings {
    fn from(config: &Config) -> Self {
        Self {
            no_wait: config.scan.no_wait,
            unstable_preferred: config.scan.unstable_preferred,
            poll_interval: config.poll_interval(),
        }
    }
}

/// What happened to one selected plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginOutcome {
    pub name: String,
    /// `None` if the service never answered a submission for this plugin.
    pub queue: Option<QueueOutcome>,
    /// Set when the submission itself failed with an API error.
    pub error: Option<String>,
    pub scan: Option<ScanResult>,
    pub verdict: Option<Verdict>,
}

/// Summary of one orchestration run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub target: String,
    pub verdict: Verdict,
    pub end: RunEnd,
    pub plugins: Vec<PluginOutcome>,
    pub poll_cycles: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Drives one run against a [`ScanClient`].
pub struct Orchestrator<C: ScanClient> {
    client: C,
    settings: RunSettings,
    cancel: CancelToken,
}

impl<C: ScanClient> Orchestrator<C> {
    pub fn new(client: C, settings: RunSettings) -> Self {
        Self {
            client,
            settings,
            cancel: CancelToken::new(),
        }
    }

    /// Share an externally owned token, e.g. one tripped by Ctrl+C.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Queue every plugin, wait for results unless told not to, and judge.
    ///
    /// Scan problems never surface as errors; they are folded into the
    /// report's verdict. The log is closed before this returns.
    pub fn run(&self, target: &str, plugins: &[String], mut log: RunLog) -> RunReport {
        let started_at = Utc::now();
        let plugins = dedup_plugins(plugins);
        tracing::info!(target_name = %target, plugins = ?plugins, "starting scan run");

        let queued = QueueStage::new(&self.client).run(target, &plugins, &mut log);
        let mut verdict = queued.verdict;
        let mut resolved = Vec::new();
        let mut poll_cycles = 0;

        let end = match queued.end {
            Some(end) => end,
            None if queued.pending.is_empty() => {
                log.line("Every scan submission was skipped");
                RunEnd::AllSkipped
            }
            None if self.settings.no_wait => {
                log.line("Not waiting for the scans to finish; skipping result polling");
                RunEnd::NoWait
            }
            None => {
                log.line("Polling for scan results");
                let settings = PollSettings {
                    interval: self.settings.poll_interval,
                    unstable_preferred: self.settings.unstable_preferred,
                };
                let polled = PollStage::new(&self.client, &settings, &self.cancel).run(
                    target,
                    queued.pending,
                    verdict,
                    &mut log,
                );
                verdict.raise(polled.verdict);
                resolved = polled.resolved;
                poll_cycles = polled.cycles;
                polled.end
            }
        };

        log.line(format_args!("Finished with {verdict} ({end})"));
        log.close();
        tracing::info!(target_name = %target, %verdict, %end, "scan run finished");

        RunReport {
            target: target.to_string(),
            verdict,
            end,
            plugins: plugin_outcomes(
                &plugins,
                &queued.submissions,
                queued.failed.as_ref(),
                resolved,
            ),
            poll_cycles,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Drop blank names and repeats, keeping first-seen order.
fn dedup_plugins(plugins: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(plugins.len());
    for plugin in plugins {
        let name = plugin.trim();
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.to_string()) {
            unique.push(name.to_string());
        } else {
            tracing::warn!(plugin = %name, "plugin selected more than once, queueing it once");
        }
    }
    unique
}

fn plugin_outcomes(
    plugins: &[String],
    submissions: &[(String, QueueOutcome)],
    failed: Option<&(String, String)>,
    resolved: Vec<Resolution>,
) -> Vec<PluginOutcome> {
    let mut outcomes: Vec<PluginOutcome> = plugins
        .iter()
        .map(|name| PluginOutcome {
            name: name.clone(),
            queue: submissions
                .iter()
                .find(|(plugin, _)| plugin == name)
                .map(|(_, outcome)| *outcome),
            error: failed
                .filter(|(plugin, _)| plugin == name)
                .map(|(_, error)| error.clone()),
            scan: None,
            verdict: None,
        })
        .collect();

    for resolution in resolved {
        if let Some(outcome) = outcomes.iter_mut().find(|o| o.name == resolution.plugin) {
            outcome.scan = Some(resolution.scan);
            outcome.verdict = Some(resolution.verdict);
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::scripted::{aborted, finished, queued, ScriptedClient};
    use crate::client::StatusColor;
    use crate::orchestrator::log::memory::MemorySink;
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn fast() -> RunSettings {
        RunSettings {
            poll_interval: Duration::ZERO,
            ..RunSettings::default()
        }
    }

    fn run(client: &ScriptedClient, settings: RunSettings, plugins: &[&str]) -> (RunReport, MemorySink) {
        let sink = MemorySink::new();
        let report =
            Orchestrator::new(client, settings).run("t", &names(plugins), RunLog::new(sink.writer()));
        (report, sink)
    }

    #[test]
    fn all_green_is_success() {
        let client = ScriptedClient::new()
            .poll(vec![queued("a"), queued("b"), queued("c")])
            .poll(vec![
                finished("a", StatusColor::Green),
                finished("b", StatusColor::Green),
                finished("c", StatusColor::Green),
            ]);

        let (report, sink) = run(&client, fast(), &["a", "b", "c"]);

        assert_eq!(report.verdict, Verdict::Success);
        assert_eq!(report.end, RunEnd::Completed);
        assert_eq!(report.poll_cycles, 2);
        assert!(report
            .plugins
            .iter()
            .all(|p| p.verdict == Some(Verdict::Success)));
        assert!(!sink.contains("aborted"));
        assert_eq!(sink.closes(), 1);
    }

    #[test]
    fn skipped_plugin_is_not_waited_for() {
        let client = ScriptedClient::new()
            .queue_reply("b", QueueOutcome::Skipped)
            .poll(vec![finished("a", StatusColor::Green), queued("b")]);

        let (report, _) = run(&client, fast(), &["a", "b"]);

        // b still reports queued server-side, but the run finishes anyway.
        assert_eq!(report.verdict, Verdict::Unstable);
        assert_eq!(report.end, RunEnd::Completed);
        assert_eq!(client.fetch_count(), 1);
        assert_eq!(report.plugins[1].queue, Some(QueueOutcome::Skipped));
        assert_eq!(report.plugins[1].scan, None);
    }

    #[test]
    fn all_skipped_never_polls() {
        let client = ScriptedClient::new()
            .queue_reply("a", QueueOutcome::Skipped)
            .queue_reply("b", QueueOutcome::Skipped);

        let (report, sink) = run(&client, fast(), &["a", "b"]);

        assert_eq!(report.verdict, Verdict::Unstable);
        assert_eq!(report.end, RunEnd::AllSkipped);
        assert_eq!(client.fetch_count(), 0);
        assert!(sink.contains("Every scan submission was skipped"));
        assert_eq!(sink.closes(), 1);
    }

    #[test]
    fn queue_error_fails_fast() {
        let client = ScriptedClient::new().queue_error("a");

        let (report, sink) = run(&client, fast(), &["a", "b", "c"]);

        assert_eq!(report.verdict, Verdict::Failure);
        assert_eq!(report.end, RunEnd::QueueError);
        assert_eq!(client.submitted_plugins(), vec!["a"]);
        assert_eq!(client.fetch_count(), 0);
        assert_eq!(
            report.plugins.iter().map(|p| p.queue).collect::<Vec<_>>(),
            vec![None, None, None]
        );
        assert!(report.plugins[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("queue backend unavailable")));
        assert_eq!(report.plugins[1].error, None);
        assert_eq!(report.plugins[2].error, None);
        assert_eq!(sink.closes(), 1);
    }

    #[test]
    fn no_wait_returns_queue_floor() {
        let client = ScriptedClient::new().queue_reply("b", QueueOutcome::Skipped);
        let settings = RunSettings {
            no_wait: true,
            ..fast()
        };

        let (report, sink) = run(&client, settings, &["a", "b"]);

        assert_eq!(report.verdict, Verdict::Unstable);
        assert_eq!(report.end, RunEnd::NoWait);
        assert_eq!(client.fetch_count(), 0);
        assert_eq!(sink.closes(), 1);
    }

    #[test]
    fn no_wait_with_clean_queue_is_success() {
        let client = ScriptedClient::new();
        let settings = RunSettings {
            no_wait: true,
            ..fast()
        };

        let (report, _) = run(&client, settings, &["a"]);

        assert_eq!(report.verdict, Verdict::Success);
        assert_eq!(client.fetch_count(), 0);
    }

    #[test]
    fn aborted_scan_fails_run_and_leaves_rest_unresolved() {
        let client = ScriptedClient::new().poll(vec![
            aborted("a"),
            finished("b", StatusColor::Green),
        ]);

        let (report, _) = run(&client, fast(), &["a", "b"]);

        assert_eq!(report.verdict, Verdict::Failure);
        assert_eq!(report.end, RunEnd::ScanAborted);
        assert_eq!(report.plugins[0].verdict, Some(Verdict::Failure));
        assert_eq!(report.plugins[1].verdict, None);
    }

    #[test]
    fn prefer_unstable_softens_other_colors() {
        let red = || vec![finished("a", StatusColor::Other("red".into()))];

        let client = ScriptedClient::new().poll(red());
        let settings = RunSettings {
            unstable_preferred: true,
            ..fast()
        };
        let (soft, _) = run(&client, settings, &["a"]);
        assert_eq!(soft.verdict, Verdict::Unstable);

        let client = ScriptedClient::new().poll(red());
        let (hard, _) = run(&client, fast(), &["a"]);
        assert_eq!(hard.verdict, Verdict::Failure);
    }

    #[test]
    fn cancellation_yields_aborted_not_failure() {
        let cancel = CancelToken::new();
        let client = ScriptedClient::new()
            .poll(vec![queued("a")])
            .cancel_after_fetch(1, cancel.clone());
        let settings = RunSettings {
            poll_interval: Duration::from_secs(3600),
            ..RunSettings::default()
        };
        let sink = MemorySink::new();

        let report = Orchestrator::new(&client, settings)
            .with_cancel_token(cancel)
            .run("t", &names(&["a"]), RunLog::new(sink.writer()));

        assert_eq!(report.verdict, Verdict::Aborted);
        assert_eq!(report.end, RunEnd::Cancelled);
        assert_eq!(sink.closes(), 1);
    }

    #[test]
    fn queue_failure_keeps_plugin_pending_until_server_reports_it() {
        // A Failed/Undefined submission is not dropped from tracking, so the
        // run keeps polling until the service reports that plugin terminal.
        let client = ScriptedClient::new()
            .queue_reply("a", QueueOutcome::Failed)
            .poll(vec![queued("a"), finished("b", StatusColor::Green)])
            .poll(vec![queued("a")])
            .poll(vec![finished("a", StatusColor::Green)]);

        let (report, _) = run(&client, fast(), &["a", "b"]);

        assert_eq!(report.verdict, Verdict::Failure);
        assert_eq!(report.end, RunEnd::Completed);
        assert_eq!(client.fetch_count(), 3);
        assert_eq!(report.plugins[0].queue, Some(QueueOutcome::Failed));
        assert_eq!(report.plugins[0].verdict, Some(Verdict::Success));
    }

    #[test]
    fn poll_error_fails_run() {
        let client = ScriptedClient::new().poll(vec![queued("a")]).poll_error();

        let (report, sink) = run(&client, fast(), &["a"]);

        assert_eq!(report.verdict, Verdict::Failure);
        assert_eq!(report.end, RunEnd::PollError);
        assert!(sink.contains("Unexpected response while polling"));
    }

    #[test]
    fn duplicate_and_blank_plugins_are_queued_once() {
        let client = ScriptedClient::new().poll(vec![finished("a", StatusColor::Green)]);

        let (report, _) = run(&client, fast(), &["a", " ", "a"]);

        assert_eq!(client.submitted_plugins(), vec!["a"]);
        assert_eq!(report.plugins.len(), 1);
        assert_eq!(report.verdict, Verdict::Success);
    }

    #[test]
    fn finishes_with_a_summary_line() {
        let client = ScriptedClient::new().poll(vec![finished("a", StatusColor::Grey)]);

        let (_, sink) = run(&client, fast(), &["a"]);

        let lines = sink.lines();
        assert_eq!(
            lines.last().map(String::as_str),
            Some("Finished with UNSTABLE (completed)")
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        fn any_outcome() -> impl Strategy<Value = QueueOutcome> {
            prop_oneof![
                Just(QueueOutcome::Success),
                Just(QueueOutcome::Skipped),
                Just(QueueOutcome::Failed),
                Just(QueueOutcome::Undefined),
            ]
        }

        fn scripted(outcomes: &BTreeMap<String, QueueOutcome>) -> ScriptedClient {
            outcomes
                .iter()
                .fold(ScriptedClient::new(), |client, (name, outcome)| {
                    client.queue_reply(name, *outcome)
                })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn all_green_plugins_succeed(
                plugins in prop::collection::btree_set("[a-z]{1,6}", 1..8),
            ) {
                let plugins: Vec<String> = plugins.into_iter().collect();
                let client = ScriptedClient::new().poll(
                    plugins
                        .iter()
                        .map(|p| finished(p, StatusColor::Green))
                        .collect(),
                );
                let sink = MemorySink::new();

                let report = Orchestrator::new(&client, fast())
                    .run("t", &plugins, RunLog::new(sink.writer()));

                prop_assert_eq!(report.verdict, Verdict::Success);
                prop_assert_eq!(report.end, RunEnd::Completed);
                prop_assert_eq!(client.fetch_count(), 1);
                prop_assert!(report.plugins.iter().all(|p| p.verdict == Some(Verdict::Success)));
                prop_assert!(!sink.contains("aborted"));
            }

            #[test]
            fn no_wait_returns_the_queue_verdict(
                outcomes in prop::collection::btree_map("[a-z]{1,6}", any_outcome(), 1..8),
            ) {
                let plugins: Vec<String> = outcomes.keys().cloned().collect();
                let floor = QueueStage::new(&scripted(&outcomes))
                    .run("t", &plugins, &mut RunLog::new(std::io::sink()))
                    .verdict;

                let client = scripted(&outcomes);
                let settings = RunSettings { no_wait: true, ..fast() };
                let report = Orchestrator::new(&client, settings)
                    .run("t", &plugins, RunLog::new(std::io::sink()));

                prop_assert_eq!(client.fetch_count(), 0);
                prop_assert_eq!(report.verdict, floor);
                prop_assert!(matches!(report.end, RunEnd::NoWait | RunEnd::AllSkipped));
            }

            #[test]
            fn skipped_plugins_leave_the_pending_set(
                outcomes in prop::collection::btree_map("[a-z]{1,6}", any_outcome(), 1..8),
            ) {
                let plugins: Vec<String> = outcomes.keys().cloned().collect();
                let client = scripted(&outcomes);

                let report = QueueStage::new(&client)
                    .run("t", &plugins, &mut RunLog::new(std::io::sink()));

                for (name, outcome) in &outcomes {
                    let skipped = *outcome == QueueOutcome::Skipped;
                    prop_assert_eq!(report.pending.contains(name), !skipped);
                }
                if outcomes.values().any(|o| *o == QueueOutcome::Skipped) {
                    prop_assert!(report.verdict >= Verdict::Unstable);
                }
                prop_assert_eq!(client.submitted_plugins(), plugins);
            }
        }
    }
}
