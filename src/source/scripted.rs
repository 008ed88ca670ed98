//! Scripted source for tests: replays queued results, optionally holding
//! each one until the test releases it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::RemoteAppointmentSource;
use crate::error::FetchError;
use crate::models::appointment::{Appointment, AppointmentSnapshot};

struct Step {
    result: Result<AppointmentSnapshot, FetchError>,
    gate: Option<oneshot::Receiver<()>>,
}

#[derive(Default)]
pub(crate) struct ScriptedSource {
    calls: AtomicUsize,
    steps: Mutex<VecDeque<Step>>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_ok(&self, snapshot: AppointmentSnapshot) {
        self.push(Ok(snapshot), None);
    }

    pub(crate) fn push_err(&self, err: FetchError) {
        self.push(Err(err), None);
    }

    /// Queue a result that is only returned once the sender fires.
    pub(crate) fn push_gated(
        &self,
        result: Result<AppointmentSnapshot, FetchError>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(result, Some(rx));
        tx
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Yield until at least `n` fetches have started.
    pub(crate) async fn wait_for_calls(&self, n: usize) {
        while self.calls() < n {
            tokio::task::yield_now().await;
        }
    }

    fn push(&self, result: Result<AppointmentSnapshot, FetchError>, gate: Option<oneshot::Receiver<()>>) {
        self.steps.lock().unwrap().push_back(Step { result, gate });
    }
}

#[async_trait]
impl RemoteAppointmentSource for ScriptedSource {
    async fn fetch(&self) -> Result<AppointmentSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        let Some(step) = step else {
            return Ok(AppointmentSnapshot::default());
        };
        if let Some(gate) = step.gate {
            let _ = gate.await;
        }
        step.result
    }
}

/// Snapshot with one appointment per id.
pub(crate) fn snapshot(ids: &[&str]) -> AppointmentSnapshot {
    AppointmentSnapshot {
        upcoming: ids
            .iter()
            .map(|id| Appointment {
                id: id.to_string(),
                doctor_name: format!("Dr. {id}"),
                specialty: "General".into(),
                date: "2024-05-01".into(),
                time: "10:00".into(),
                image: String::new(),
            })
            .collect(),
    }
}
