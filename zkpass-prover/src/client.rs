use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{runtime, time};
use tracing::{debug, warn};
use zkpass_common::AdmissionProof;

use crate::{CircuitInput, ProverError};

/// Produces admission proofs from circuit inputs. Implementations block until
/// the proof is ready or the circuit reports a failure.
pub trait CircuitClient: Send + Sync {
    fn prove(&self, input: &CircuitInput) -> Result<AdmissionProof, ProverError>;

    /// Prove under a deadline the client enforces itself, releasing whatever
    /// it started once the deadline passes. `None` means the client cannot be
    /// cancelled and the caller has to bound it from outside.
    fn prove_within(
        &self,
        _input: &CircuitInput,
        _timeout: Duration,
    ) -> Option<Result<AdmissionProof, ProverError>> {
        None
    }
}

impl<T: CircuitClient + ?Sized> CircuitClient for Arc<T> {
    fn prove(&self, input: &CircuitInput) -> Result<AdmissionProof, ProverError> {
        (**self).prove(input)
    }

    fn prove_within(
        &self,
        input: &CircuitInput,
        timeout: Duration,
    ) -> Option<Result<AdmissionProof, ProverError>> {
        (**self).prove_within(input, timeout)
    }
}

impl<T: CircuitClient + ?Sized> CircuitClient for Box<T> {
    fn prove(&self, input: &CircuitInput) -> Result<AdmissionProof, ProverError> {
        (**self).prove(input)
    }

    fn prove_within(
        &self,
        input: &CircuitInput,
        timeout: Duration,
    ) -> Option<Result<AdmissionProof, ProverError>> {
        (**self).prove_within(input, timeout)
    }
}

/// Bounds the wrapped client by `timeout`.
///
/// Clients that implement [`CircuitClient::prove_within`] enforce the
/// deadline themselves. Any other client runs on a blocking task; when it
/// overruns, its late result is dropped.
pub struct TimeoutCircuitClient<C> {
    inner: Arc<C>,
    timeout: Duration,
}

impl<C> TimeoutCircuitClient<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<C: CircuitClient + 'static> CircuitClient for TimeoutCircuitClient<C> {
    fn prove(&self, input: &CircuitInput) -> Result<AdmissionProof, ProverError> {
        input.validate()?;

        let started = Instant::now();
        let result = match self.inner.prove_within(input, self.timeout) {
            Some(result) => result,
            None => self.prove_on_blocking_task(input),
        };
        match &result {
            Err(ProverError::Timeout(_)) => {
                warn!(timeout = ?self.timeout, event = %input.contract_addr, "circuit client timed out")
            }
            _ => debug!(elapsed_ms = started.elapsed().as_millis() as u64, "circuit client answered"),
        }
        result
    }

    fn prove_within(
        &self,
        input: &CircuitInput,
        timeout: Duration,
    ) -> Option<Result<AdmissionProof, ProverError>> {
        let bounded = TimeoutCircuitClient {
            inner: Arc::clone(&self.inner),
            timeout: timeout.min(self.timeout),
        };
        Some(bounded.prove(input))
    }
}

impl<C: CircuitClient + 'static> TimeoutCircuitClient<C> {
    fn prove_on_blocking_task(&self, input: &CircuitInput) -> Result<AdmissionProof, ProverError> {
        let runtime = runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|err| ProverError::Circuit(format!("failed to start runtime: {err}")))?;

        let inner = Arc::clone(&self.inner);
        let job = input.clone();
        let task = runtime.spawn_blocking(move || inner.prove(&job));
        let outcome = runtime.block_on(time::timeout(self.timeout, task));
        // Dropping the runtime would wait for an overrunning task.
        runtime.shutdown_background();

        match outcome {
            Ok(Ok(result)) => result,
            // The task panicked.
            Ok(Err(_)) => Err(ProverError::Disconnected),
            Err(_) => Err(ProverError::Timeout(self.timeout)),
        }
    }
}

/// Run `future` to completion from synchronous code on a temporary runtime.
///
/// Inside an existing runtime the temporary one gets its own thread, since a
/// runtime cannot be started from a runtime thread.
pub(crate) fn block_on_fresh<F>(future: F) -> Result<F::Output, ProverError>
where
    F: Future + Send,
    F::Output: Send,
{
    let run = move || {
        runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map(|runtime| runtime.block_on(future))
            .map_err(|err| ProverError::Circuit(format!("failed to start runtime: {err}")))
    };
    match runtime::Handle::try_current() {
        Ok(_) => std::thread::scope(|scope| {
            scope
                .spawn(run)
                .join()
                .unwrap_or(Err(ProverError::Disconnected))
        }),
        Err(_) => run(),
    }
}
