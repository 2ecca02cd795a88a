//! In-memory [`ScanClient`] that replays canned answers, for tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use super::{
    PluginStatus, QueueOutcome, ResultStatus, ScanClient, ScanRequest, ScanResult, StatusColor,
};
use crate::error::ApiError;
use crate::orchestrator::CancelToken;

pub(crate) enum Reply<T> {
    Ok(T),
    Err,
}

#[derive(Default)]
pub(crate) struct ScriptedClient {
    queue_replies: HashMap<String, Reply<QueueOutcome>>,
    polls: RefCell<VecDeque<Reply<Vec<PluginStatus>>>>,
    cancel_on_fetch: Option<(usize, CancelToken)>,
    pub submitted: RefCell<Vec<ScanRequest>>,
    pub fetches: RefCell<usize>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_reply(mut self, plugin: &str, outcome: QueueOutcome) -> Self {
        self.queue_replies.insert(plugin.into(), Reply::Ok(outcome));
        self
    }

    pub fn queue_error(mut self, plugin: &str) -> Self {
        self.queue_replies.insert(plugin.into(), Reply::Err);
        self
    }

    pub fn poll(self, statuses: Vec<PluginStatus>) -> Self {
        self.polls.borrow_mut().push_back(Reply::Ok(statuses));
        self
    }

    pub fn poll_error(self) -> Self {
        self.polls.borrow_mut().push_back(Reply::Err);
        self
    }

    /// Trip `token` right after the `nth` (1-based) status fetch.
    pub fn cancel_after_fetch(mut self, nth: usize, token: CancelToken) -> Self {
        self.cancel_on_fetch = Some((nth, token));
        self
    }

    pub fn submitted_plugins(&self) -> Vec<String> {
        self.submitted
            .borrow()
            .iter()
            .map(|r| r.plugin.clone())
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.borrow()
    }
}

impl ScanClient for ScriptedClient {
    fn queue(&self, request: &ScanRequest) -> Result<QueueOutcome, ApiError> {
        self.submitted.borrow_mut().push(request.clone());
        match self.queue_replies.get(&request.plugin) {
            Some(Reply::Ok(outcome)) => Ok(*outcome),
            Some(Reply::Err) => Err(ApiError::Status {
                status: 500,
                body: "queue backend unavailable".into(),
            }),
            None => Ok(QueueOutcome::Success),
        }
    }

    fn fetch_target_status(&self, _target: &str) -> Result<Vec<PluginStatus>, ApiError> {
        let count = {
            let mut fetches = self.fetches.borrow_mut();
            *fetches += 1;
            *fetches
        };
        if let Some((nth, token)) = &self.cancel_on_fetch {
            if *nth == count {
                token.cancel();
            }
        }
        match self.polls.borrow_mut().pop_front() {
            Some(Reply::Ok(statuses)) => Ok(statuses),
            Some(Reply::Err) => Err(ApiError::Unauthorized),
            None => Err(ApiError::Malformed("poll script exhausted".into())),
        }
    }
}

pub(crate) fn queued(name: &str) -> PluginStatus {
    PluginStatus {
        name: name.into(),
        is_queued: true,
        scan: None,
    }
}

pub(crate) fn finished(name: &str, color: StatusColor) -> PluginStatus {
    PluginStatus {
        name: name.into(),
        is_queued: false,
        scan: Some(ScanResult {
            result_status: ResultStatus::Ok,
            status: "finished".into(),
            status_color: color,
            message: format!("{name} completed"),
            result_url: format!("https://console.walti.io/targets/t/plugins/{name}"),
        }),
    }
}

pub(crate) fn aborted(name: &str) -> PluginStatus {
    let mut status = finished(name, StatusColor::Other("red".into()));
    if let Some(scan) = status.scan.as_mut() {
        scan.result_status = ResultStatus::Aborted;
    }
    status
}
