//! External bulk copy: a whole container delegated to an external
//! executable, driven entirely through its standard output.
//!
//! The tool does its own diffing and parallelism; idempotence rests on its
//! skip-same-or-newer overwrite policy rather than on the container differ,
//! which this strategy bypasses.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use async_trait::async_trait;

use super::{ContainerPair, TransferContainer};
use crate::core::{BlobStore, SasPermissions};
use crate::error::{ReplicateError, Result};

/// Everything before this marker is tool preamble and is suppressed.
const JOB_STARTED_MARKER: &str = "has started";

/// The line carrying this marker ends the wait; its tail is the job verdict.
const FINAL_STATUS_MARKER: &str = "Final Job Status:";

/// Container-level strategy shelling out to an external bulk-copy tool.
pub struct BulkCopy {
    source: Arc<dyn BlobStore>,
    destination: Arc<dyn BlobStore>,
    executable: PathBuf,
    preserve_access_tier: bool,
    sas_expiry: Duration,
    idle_timeout: Duration,
}

impl BulkCopy {
    pub fn new(
        source: Arc<dyn BlobStore>,
        destination: Arc<dyn BlobStore>,
        executable: PathBuf,
        preserve_access_tier: bool,
        sas_expiry: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            source,
            destination,
            executable,
            preserve_access_tier,
            sas_expiry,
            idle_timeout,
        }
    }

    /// Command-line arguments for one container. The URLs embed SAS tokens,
    /// so the argument list must never be logged.
    fn build_arguments(&self, source_url: &str, destination_url: &str) -> Vec<String> {
        vec![
            "copy".to_string(),
            source_url.to_string(),
            destination_url.to_string(),
            "--recursive".to_string(),
            "--overwrite=ifSourceNewer".to_string(),
            format!("--s2s-preserve-access-tier={}", self.preserve_access_tier),
        ]
    }
}

#[async_trait]
impl TransferContainer for BulkCopy {
    async fn transfer_container(
        &self,
        containers: &ContainerPair,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let source_url = self.source.container_sas_url(
            &containers.source,
            SasPermissions::read_list(),
            self.sas_expiry,
        )?;
        let destination_url = self.destination.container_sas_url(
            &containers.destination,
            SasPermissions::read_write_list(),
            self.sas_expiry,
        )?;

        info!(
            source = %containers.source,
            destination = %containers.destination,
            executable = %self.executable.display(),
            "delegating container to bulk copy"
        );

        let mut child = Command::new(&self.executable)
            .args(self.build_arguments(&source_url, &destination_url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ReplicateError::BulkCopy("bulk-copy process has no stdout pipe".into())
        })?;

        let verdict = scan_output(BufReader::new(stdout), cancel, self.idle_timeout).await;

        match verdict {
            Ok(status) => {
                let exit = child.wait().await?;
                if !exit.success() {
                    return Err(ReplicateError::BulkCopy(format!(
                        "bulk-copy exited with {} (job status: {})",
                        exit, status
                    )));
                }
                if status.starts_with("Completed") {
                    info!(container = %containers.source, "bulk copy finished: {}", status);
                    Ok(())
                } else {
                    Err(ReplicateError::BulkCopy(format!(
                        "bulk-copy job ended with status: {}",
                        status
                    )))
                }
            }
            Err(err) => {
                // The scanner gave up (timeout, cancellation, garbage
                // output); don't leave the child running.
                if let Err(kill_err) = child.kill().await {
                    warn!("failed to kill bulk-copy process: {}", kill_err);
                }
                Err(err)
            }
        }
    }
}

/// Scan the tool's stdout: suppress preamble until the job-start marker,
/// forward progress lines, stop at the final-status marker. Every read is
/// bounded by `idle_timeout`, and EOF before the final marker is an error
/// rather than a hang.
async fn scan_output<R>(
    reader: BufReader<R>,
    cancel: &CancellationToken,
    idle_timeout: Duration,
) -> Result<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    let mut started = false;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReplicateError::Cancelled),
            next = tokio::time::timeout(idle_timeout, lines.next_line()) => next,
        };

        let line = match next {
            Err(_) => {
                return Err(ReplicateError::timeout(
                    "bulk-copy output",
                    idle_timeout.as_secs(),
                ))
            }
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                return Err(ReplicateError::BulkCopy(
                    "bulk-copy output ended before the final job status".into(),
                ))
            }
            Ok(Err(err)) => return Err(err.into()),
        };

        if let Some(index) = line.find(FINAL_STATUS_MARKER) {
            return Ok(line[index + FINAL_STATUS_MARKER.len()..].trim().to_string());
        }

        if !started {
            if line.contains(JOB_STARTED_MARKER) {
                started = true;
                info!("bulk copy job started");
            }
            continue;
        }

        info!("bulk copy: {}", line.trim_end());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::fake::FakeBlobStore;

    fn strategy() -> BulkCopy {
        BulkCopy::new(
            Arc::new(FakeBlobStore::new("src")),
            Arc::new(FakeBlobStore::new("dst")),
            PathBuf::from("/usr/local/bin/azcopy"),
            true,
            Duration::from_secs(3600),
            Duration::from_secs(5),
        )
    }

    async fn scan(output: &str, idle_timeout: Duration) -> Result<String> {
        let reader = BufReader::new(output.as_bytes());
        scan_output(reader, &CancellationToken::new(), idle_timeout).await
    }

    #[tokio::test]
    async fn test_scan_finds_final_status() {
        let output = "\
INFO: Scanning...
Job e1f2a3 has started
Log file is located at: /tmp/azcopy.log
0.0 %, 0 Done, 0 Failed, 12 Pending
100.0 %, 12 Done, 0 Failed, 0 Pending
Final Job Status: Completed
";
        let status = scan(output, Duration::from_secs(1)).await.unwrap();
        assert_eq!(status, "Completed");
    }

    #[tokio::test]
    async fn test_scan_reports_failed_status() {
        let output = "Job x has started\nFinal Job Status: CompletedWithErrors\n";
        let status = scan(output, Duration::from_secs(1)).await.unwrap();
        assert_eq!(status, "CompletedWithErrors");
    }

    #[tokio::test]
    async fn test_eof_without_final_marker_is_error() {
        let output = "Job x has started\n50.0 %, 1 Done\n";
        let result = scan(output, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ReplicateError::BulkCopy(_))));
    }

    #[tokio::test]
    async fn test_silent_stream_times_out() {
        // A pipe that never produces output; the idle timeout must fire.
        let (_writer, reader) = tokio::io::duplex(64);
        let result = scan_output(
            BufReader::new(reader),
            &CancellationToken::new(),
            Duration::from_millis(20),
        )
        .await;
        assert!(matches!(result, Err(ReplicateError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_cancellation_stops_scanning() {
        let (_writer, reader) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = scan_output(BufReader::new(reader), &cancel, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ReplicateError::Cancelled)));
    }

    #[test]
    fn test_arguments_shape() {
        let strategy = strategy();
        let args = strategy.build_arguments(
            "https://src.blob.fake/asset-1?sp=rl&sig=fake",
            "https://dst.blob.fake/asset-1?sp=rcwl&sig=fake",
        );
        assert_eq!(args[0], "copy");
        assert!(args[1].contains("sp=rl"));
        assert!(args[2].contains("sp=rcwl"));
        assert!(args.contains(&"--recursive".to_string()));
        assert!(args.contains(&"--overwrite=ifSourceNewer".to_string()));
        assert!(args.contains(&"--s2s-preserve-access-tier=true".to_string()));
    }

    #[test]
    fn test_access_tier_flag_follows_config() {
        let strategy = BulkCopy::new(
            Arc::new(FakeBlobStore::new("src")),
            Arc::new(FakeBlobStore::new("dst")),
            PathBuf::from("azcopy"),
            false,
            Duration::from_secs(3600),
            Duration::from_secs(5),
        );
        let args = strategy.build_arguments("s", "d");
        assert!(args.contains(&"--s2s-preserve-access-tier=false".to_string()));
    }
}
