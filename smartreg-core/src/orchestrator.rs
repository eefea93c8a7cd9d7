//! Bounded fan-out of the registration workflow over a batch of devices.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::{Stream, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, error, info, info_span};

use crate::{
    device::{ConnectionParameters, DeviceRecord},
    outcome::RegistrationOutcome,
    workflow::{RegistrationRequest, RegistrationWorkflow},
};

/// Simultaneous device workflows per batch unless configured otherwise.
pub const DEFAULT_MAX_WORKERS: usize = 25;

/// One submission: shared credentials, targets, token and server.
#[derive(Debug, Clone)]
pub struct Batch {
    params: ConnectionParameters,
    addresses: Vec<String>,
    request: RegistrationRequest,
}

impl Batch {
    /// Batch of `addresses` sharing `params` and `request`.
    pub fn new<I, S>(
        params: ConnectionParameters,
        addresses: I,
        request: RegistrationRequest,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            params,
            addresses: addresses.into_iter().map(Into::into).collect(),
            request,
        }
    }

    /// Splits a free-form device list on whitespace. Duplicates are kept.
    pub fn parse_addresses(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    /// Credentials template applied to every device.
    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    /// Token and licensing server.
    pub fn request(&self) -> &RegistrationRequest {
        &self.request
    }

    /// Target addresses in submission order.
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Number of targets, duplicates included.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// True when there are no targets.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

struct DeviceJob {
    index: usize,
    device: DeviceRecord,
}

/// Runs a batch with at most `max_workers` devices in flight.
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    workflow: RegistrationWorkflow,
    max_workers: usize,
}

impl BatchOrchestrator {
    /// Orchestrator with [`DEFAULT_MAX_WORKERS`].
    pub fn new(workflow: RegistrationWorkflow) -> Self {
        Self {
            workflow,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    /// Sets the ceiling; zero is raised to one.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Ceiling on devices in flight.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Workflow run for each device.
    pub fn workflow(&self) -> &RegistrationWorkflow {
        &self.workflow
    }

    /// Starts the batch and returns its outcomes in completion order.
    ///
    /// Must be called from within a tokio runtime. The stream yields exactly
    /// one outcome per submitted address. Dropping it does not cancel
    /// devices already queued; their outcomes are discarded.
    pub fn run(&self, batch: Batch) -> OutcomeStream {
        let Batch {
            params,
            addresses,
            request,
        } = batch;
        let total = addresses.len();

        let (job_tx, job_rx) = mpsc::unbounded_channel::<DeviceJob>();
        for (index, address) in addresses.into_iter().enumerate() {
            let device = DeviceRecord::new(address, &params);
            // job_rx is alive until the workers below exit.
            let _ = job_tx.send(DeviceJob { index, device });
        }
        drop(job_tx);

        let (outcome_tx, outcome_rx) = mpsc::channel(total.max(1));
        let workers = self.max_workers.min(total);
        info!(devices = total, workers, "starting registration batch");

        let job_rx = Arc::new(Mutex::new(job_rx));
        let request = Arc::new(request);
        for worker_id in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let outcome_tx = outcome_tx.clone();
            let workflow = self.workflow.clone();
            let request = Arc::clone(&request);

            tokio::spawn(
                async move {
                    loop {
                        let job = {
                            let mut guard = job_rx.lock().await;
                            guard.recv().await
                        };
                        let Some(job) = job else { break };

                        let outcome =
                            run_isolated(&workflow, &request, job).await;
                        if outcome_tx.send(outcome).await.is_err() {
                            debug!("outcome stream dropped; continuing batch");
                        }
                    }
                    debug!("worker finished");
                }
                .instrument(info_span!("worker", id = worker_id)),
            );
        }

        OutcomeStream {
            inner: ReceiverStream::new(outcome_rx),
            expected: total,
            delivered: 0,
        }
    }
}

/// Runs one device in its own task so a panic stays contained to it.
async fn run_isolated(
    workflow: &RegistrationWorkflow,
    request: &Arc<RegistrationRequest>,
    job: DeviceJob,
) -> RegistrationOutcome {
    let DeviceJob { index, mut device } = job;
    let address = device.address().to_string();
    let workflow = workflow.clone();
    let request = Arc::clone(request);
    let span = info_span!("device", address = %address, index);

    let handle = tokio::spawn(
        async move { workflow.run(&mut device, &request).await }
            .instrument(span),
    );

    match handle.await {
        Ok(Ok(outcome)) => {
            info!(address = %address, outcome = %outcome, "device finished");
            outcome
        }
        Ok(Err(err)) => {
            error!(address = %address, error = %err, "device workflow failed");
            RegistrationOutcome::Error {
                address,
                message: err.to_string(),
            }
        }
        Err(join_err) => {
            let message = if join_err.is_panic() {
                "device workflow panicked".to_string()
            } else {
                join_err.to_string()
            };
            error!(address = %address, error = %message, "device task aborted");
            RegistrationOutcome::Error { address, message }
        }
    }
}

/// Outcomes of one batch, yielded as devices finish.
#[derive(Debug)]
pub struct OutcomeStream {
    inner: ReceiverStream<RegistrationOutcome>,
    expected: usize,
    delivered: usize,
}

impl OutcomeStream {
    /// Number of outcomes the stream yields in total.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Outcomes not yet yielded.
    pub fn remaining(&self) -> usize {
        self.expected.saturating_sub(self.delivered)
    }

    /// Waits for every outcome of the batch.
    pub async fn collect_all(mut self) -> Vec<RegistrationOutcome> {
        let mut outcomes = Vec::with_capacity(self.expected);
        while let Some(outcome) = self.next().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

impl Stream for OutcomeStream {
    type Item = RegistrationOutcome;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        if let Poll::Ready(Some(_)) = &polled {
            self.delivered += 1;
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}
