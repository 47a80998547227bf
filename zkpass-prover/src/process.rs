use std::{io, path::PathBuf, process::Stdio, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    time,
};
use tracing::{debug, warn};
use zkpass_common::AdmissionProof;

use crate::{client::block_on_fresh, CircuitClient, CircuitInput, ProverError};

/// Runs an external prover program: circuit input JSON on stdin, proof JSON
/// (`{"proof": {"a", "b", "c"}, "publicInputs": [...]}`) on stdout.
///
/// With a deadline, an overrunning program is killed and reaped before the
/// call returns [`ProverError::Timeout`].
#[derive(Clone, Debug)]
pub struct ProcessCircuitClient {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

struct Finished {
    status: std::process::ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ProcessCircuitClient {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn run(
        &self,
        input: &CircuitInput,
        timeout: Option<Duration>,
    ) -> Result<AdmissionProof, ProverError> {
        input.validate()?;
        let payload = serde_json::to_vec(input)
            .map_err(|err| ProverError::Input(format!("failed to encode input: {err}")))?;

        let finished = block_on_fresh(self.spawn_and_exchange(&payload, timeout))??;
        debug!(status = %finished.status, stdout_len = finished.stdout.len(), "prover process exited");

        if !finished.status.success() {
            let stderr = String::from_utf8_lossy(&finished.stderr);
            return Err(ProverError::Circuit(format!(
                "prover exited with {}: {}",
                finished.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&finished.stdout)
            .map_err(|err| ProverError::Circuit(format!("unreadable proof output: {err}")))
    }

    async fn spawn_and_exchange(
        &self,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Finished, ProverError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                ProverError::Circuit(format!("failed to start {}: {err}", self.program.display()))
            })?;

        let exchanged = match timeout {
            Some(limit) => match time::timeout(limit, exchange(&mut child, payload)).await {
                Ok(exchanged) => exchanged,
                Err(_) => {
                    warn!(program = %self.program.display(), timeout = ?limit, "killing overrunning prover");
                    // Kill and reap so no process outlives the call.
                    child.kill().await.ok();
                    return Err(ProverError::Timeout(limit));
                }
            },
            None => exchange(&mut child, payload).await,
        };
        exchanged.map_err(|err| ProverError::Circuit(format!("prover process failed: {err}")))
    }
}

/// Feed the input, collect both output streams and wait for exit.
async fn exchange(child: &mut Child, payload: &[u8]) -> io::Result<Finished> {
    if let Some(mut stdin) = child.stdin.take() {
        match stdin.write_all(payload).await {
            // The program may exit without reading; its status tells why.
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {}
            other => other?,
        }
    }

    let mut out_pipe = child.stdout.take();
    let mut err_pipe = child.stderr.take();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let (out, err) = tokio::join!(
        async {
            match out_pipe.as_mut() {
                Some(pipe) => pipe.read_to_end(&mut stdout).await.map(|_| ()),
                None => Ok(()),
            }
        },
        async {
            match err_pipe.as_mut() {
                Some(pipe) => pipe.read_to_end(&mut stderr).await.map(|_| ()),
                None => Ok(()),
            }
        },
    );
    out?;
    err?;
    let status = child.wait().await?;
    Ok(Finished {
        status,
        stdout,
        stderr,
    })
}

impl CircuitClient for ProcessCircuitClient {
    fn prove(&self, input: &CircuitInput) -> Result<AdmissionProof, ProverError> {
        self.run(input, self.timeout)
    }

    fn prove_within(
        &self,
        input: &CircuitInput,
        timeout: Duration,
    ) -> Option<Result<AdmissionProof, ProverError>> {
        let limit = self.timeout.map_or(timeout, |own| own.min(timeout));
        Some(self.run(input, Some(limit)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{fs, process};

    use halo2curves_axiom::bn256::Fr;
    use zkpass_common::{zero_value, Criteria, CriteriaOp, EventId, TreeProof, TREE_DEPTH};

    use crate::TimeoutCircuitClient;

    /// A prover that records its pid, reads its input and then hangs.
    fn hanging_prover(tag: &str) -> (ProcessCircuitClient, PathBuf) {
        let pid_file = std::env::temp_dir().join(format!("zkpass-prover-{}-{tag}.pid", process::id()));
        let script = format!("echo $$ > {}; cat >/dev/null; exec sleep 30", pid_file.display());
        (ProcessCircuitClient::new("sh").arg("-c").arg(script), pid_file)
    }

    fn is_running(pid_file: &PathBuf) -> bool {
        let pid = fs::read_to_string(pid_file).unwrap();
        fs::remove_file(pid_file).ok();
        process::Command::new("kill")
            .arg("-0")
            .arg(pid.trim())
            .stderr(Stdio::null())
            .status()
            .unwrap()
            .success()
    }

    fn input() -> CircuitInput {
        let path = TreeProof {
            index: 0,
            root: Fr::from(1u64),
            siblings: (0..TREE_DEPTH).map(zero_value).collect(),
        };
        CircuitInput::new(
            Fr::from(5u64),
            EventId([9u8; 20]),
            &Criteria::new(0, CriteriaOp::Eq, Fr::from(1u64)),
            &path,
        )
    }

    #[test]
    fn failing_program_reports_circuit_error() {
        let client = ProcessCircuitClient::new("sh").arg("-c").arg("cat >/dev/null; echo unsatisfied >&2; exit 3");
        match client.prove(&input()) {
            Err(ProverError::Circuit(msg)) => assert!(msg.contains("unsatisfied")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn garbage_output_is_rejected() {
        let client = ProcessCircuitClient::new("sh").arg("-c").arg("cat >/dev/null; echo nope");
        assert!(matches!(client.prove(&input()), Err(ProverError::Circuit(_))));
    }

    #[test]
    fn missing_program_is_reported() {
        let client = ProcessCircuitClient::new("/nonexistent/zkpass-circuit");
        assert!(matches!(client.prove(&input()), Err(ProverError::Circuit(_))));
    }

    #[test]
    fn overrunning_program_is_killed() {
        let (client, pid_file) = hanging_prover("own");
        let client = client.timeout(Duration::from_millis(300));
        assert!(matches!(client.prove(&input()), Err(ProverError::Timeout(_))));
        assert!(!is_running(&pid_file));
    }

    #[test]
    fn outer_timeout_reaches_the_program() {
        let (client, pid_file) = hanging_prover("outer");
        let client = TimeoutCircuitClient::new(client, Duration::from_millis(300));
        let err = client.prove(&input()).unwrap_err();
        assert!(matches!(err, ProverError::Timeout(limit) if limit == Duration::from_millis(300)));
        assert!(!is_running(&pid_file));
    }

    #[test]
    fn deadline_does_not_affect_a_prompt_program() {
        let client = ProcessCircuitClient::new("sh")
            .arg("-c")
            .arg("cat >/dev/null; echo unsatisfied >&2; exit 3")
            .timeout(Duration::from_secs(10));
        match client.prove(&input()) {
            Err(ProverError::Circuit(msg)) => assert!(msg.contains("unsatisfied")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
