//! Text extraction through an external tool
//!
//! One subprocess per attempt: `<tool> [args..] --url|--file <source> --timeout <secs>`.
//! The tool prints a single JSON object on stdout after exiting cleanly.

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::input::manager::content_hash;
use crate::input::retry::RetryPolicy;
use crate::input::source::SourceKind;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

/// Metadata reported by the extraction tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionMetadata {
    pub file_size_bytes: u64,
    pub character_count: usize,
    pub word_count: usize,
    pub line_count: usize,
    pub extraction_method: String,
    pub extraction_time_seconds: f64,
}

impl ExtractionMetadata {
    /// Fill counts the tool left out.
    fn complete_from(mut self, text: &str) -> Self {
        if self.character_count == 0 {
            self.character_count = text.chars().count();
        }
        if self.word_count == 0 {
            self.word_count = text.split_whitespace().count();
        }
        if self.line_count == 0 {
            self.line_count = text.lines().count();
        }
        if self.extraction_method.is_empty() {
            self.extraction_method = "external".to_string();
        }
        self
    }
}

/// Text returned by one successful attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub metadata: ExtractionMetadata,
}

/// Final outcome of an extraction, after retries and cache checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub text: Option<String>,
    pub content_hash: Option<String>,
    pub metadata: Option<ExtractionMetadata>,
    pub error: Option<String>,
    pub retryable: bool,
    pub was_cached: bool,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl ExtractionResult {
    pub fn extracted(extracted: ExtractedText, attempts: u32, duration: Duration) -> Self {
        let hash = content_hash(&extracted.text);
        Self {
            success: true,
            text: Some(extracted.text),
            content_hash: Some(hash),
            metadata: Some(extracted.metadata),
            error: None,
            retryable: false,
            was_cached: false,
            attempts,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// A cache hit. The hash is recomputed when the caller has none.
    pub fn cached(text: String, hash: Option<String>) -> Self {
        let hash = hash.unwrap_or_else(|| content_hash(&text));
        Self {
            success: true,
            text: Some(text),
            content_hash: Some(hash),
            metadata: None,
            error: None,
            retryable: false,
            was_cached: true,
            attempts: 0,
            duration_ms: 0,
        }
    }

    pub fn failed(error: &ExtractionError, attempts: u32, duration: Duration) -> Self {
        Self {
            success: false,
            text: None,
            content_hash: None,
            metadata: None,
            error: Some(error.to_string()),
            retryable: error.is_retryable(),
            was_cached: false,
            attempts,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Something that can turn a source into text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(
        &self,
        source: &str,
        timeout: Duration,
    ) -> std::result::Result<ExtractedText, ExtractionError>;
}

/// Run `extractor` under `policy`. Failures come back as an unsuccessful
/// result rather than an error.
pub async fn extract_with_retry(
    extractor: &dyn TextExtractor,
    source: &str,
    timeout: Duration,
    policy: &RetryPolicy,
) -> ExtractionResult {
    let started = Instant::now();
    let outcome = policy
        .run(source, |_| extractor.extract(source, timeout))
        .await;

    match outcome.result {
        Ok(extracted) => {
            debug!(
                "Extracted {} chars from {} in {} attempt(s)",
                extracted.metadata.character_count, source, outcome.attempts
            );
            ExtractionResult::extracted(extracted, outcome.attempts, started.elapsed())
        }
        Err(err) => ExtractionResult::failed(&err, outcome.attempts, started.elapsed()),
    }
}

#[derive(Debug, Deserialize)]
struct ToolOutput {
    success: bool,
    #[serde(default)]
    content_text: String,
    #[serde(default)]
    metadata: ExtractionMetadata,
    #[serde(default)]
    error: Option<String>,
}

/// Subprocess-backed extractor.
///
/// `timeout` and `retry` drive [`ExtractionClient::extract_with_retry`]. Through
/// the [`TextExtractor`] trait every call gets the caller's timeout and makes a
/// single attempt; `DocumentProcessor::from_client` carries the retry policy
/// over to the processor.
#[derive(Debug, Clone)]
pub struct ExtractionClient {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    retry: RetryPolicy,
    termination_grace: Duration,
}

impl ExtractionClient {
    /// Create a new client for `program` with default timeout and retry policy
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            termination_grace: Duration::from_secs(2),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.command.clone())
            .with_args(config.args.clone())
            .with_timeout(config.timeout())
            .with_retry(config.retry_policy())
            .with_termination_grace(Duration::from_millis(config.termination_grace_ms))
    }

    /// Arguments placed before the source flags, e.g. a script path.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Full argument list for one invocation.
    pub fn command_args(&self, source: &str, timeout: Duration) -> Vec<String> {
        let timeout_secs = ((timeout.as_millis() + 999) / 1000).max(1);
        let mut args = self.args.clone();
        args.push(SourceKind::detect(source).flag().to_string());
        args.push(source.to_string());
        args.push("--timeout".to_string());
        args.push(timeout_secs.to_string());
        args
    }

    /// Extract with this client's own timeout and retry policy.
    pub async fn extract_with_retry(&self, source: &str) -> ExtractionResult {
        extract_with_retry(self, source, self.timeout, &self.retry).await
    }

    async fn run_tool(
        &self,
        source: &str,
        timeout: Duration,
    ) -> std::result::Result<(std::process::ExitStatus, Vec<u8>, Vec<u8>), ExtractionError> {
        let mut command = Command::new(&self.program);
        command
            .args(self.command_args(source, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| ExtractionError::Spawn {
            tool: self.program.clone(),
            source,
        })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractionError::MalformedOutput("stdout was not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExtractionError::MalformedOutput("stderr was not captured".to_string()))?;

        let collected = {
            let collect = async {
                let mut out = Vec::new();
                let mut err = Vec::new();
                let (status, _, _) = tokio::try_join!(
                    child.wait(),
                    stdout.read_to_end(&mut out),
                    stderr.read_to_end(&mut err)
                )?;
                Ok::<_, std::io::Error>((status, out, err))
            };
            tokio::time::timeout(timeout, collect).await
        };

        match collected {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!("Extraction of {} exceeded {:?}, terminating", source, timeout);
                self.terminate(&mut child).await;
                Err(ExtractionError::Timeout(timeout))
            }
        }
    }

    /// SIGTERM first, hard kill once the grace period runs out.
    async fn terminate(&self, child: &mut Child) {
        if send_terminate(child)
            && tokio::time::timeout(self.termination_grace, child.wait())
                .await
                .is_ok()
        {
            return;
        }
        if let Err(e) = child.kill().await {
            warn!("Failed to kill extraction process: {}", e);
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &Child) -> bool {
    match child.id() {
        Some(pid) => {
            // SAFETY: the pid belongs to a child we spawned and have not reaped.
            unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
        }
        None => false,
    }
}

#[cfg(not(unix))]
fn send_terminate(_child: &Child) -> bool {
    false
}

fn parse_tool_output(
    status: std::process::ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
) -> std::result::Result<ExtractedText, ExtractionError> {
    if !status.success() {
        return Err(ExtractionError::NonZeroExit {
            code: status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8(stdout)
        .map_err(|e| ExtractionError::MalformedOutput(format!("stdout is not UTF-8: {}", e)))?;
    let output: ToolOutput = serde_json::from_str(stdout.trim())
        .map_err(|e| ExtractionError::MalformedOutput(e.to_string()))?;

    if !output.success {
        return Err(ExtractionError::ToolReported(
            output
                .error
                .unwrap_or_else(|| "tool reported failure without a message".to_string()),
        ));
    }

    let metadata = output.metadata.complete_from(&output.content_text);
    Ok(ExtractedText {
        text: output.content_text,
        metadata,
    })
}

#[async_trait]
impl TextExtractor for ExtractionClient {
    async fn extract(
        &self,
        source: &str,
        timeout: Duration,
    ) -> std::result::Result<ExtractedText, ExtractionError> {
        info!("Extracting text from {}", source);
        let (status, stdout, stderr) = self.run_tool(source, timeout).await?;
        parse_tool_output(status, stdout, stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args() {
        let client = ExtractionClient::new("python3").with_args(vec!["extract.py".to_string()]);
        assert_eq!(
            client.command_args("https://example.org/a.pdf", Duration::from_millis(1500)),
            vec!["extract.py", "--url", "https://example.org/a.pdf", "--timeout", "2"]
        );
        assert_eq!(
            client.command_args("/tmp/a.pdf", Duration::from_millis(10)),
            vec!["extract.py", "--file", "/tmp/a.pdf", "--timeout", "1"]
        );
    }

    #[test]
    fn test_metadata_fills_missing_counts() {
        let metadata = ExtractionMetadata::default().complete_from("one two\nthree");
        assert_eq!(metadata.word_count, 3);
        assert_eq!(metadata.line_count, 2);
        assert_eq!(metadata.character_count, 13);
        assert_eq!(metadata.extraction_method, "external");
    }

    #[test]
    fn test_cached_result_hashes_text() {
        let result = ExtractionResult::cached("hello".to_string(), None);
        assert!(result.was_cached);
        assert_eq!(result.attempts, 0);
        assert_eq!(result.content_hash.as_deref(), Some(content_hash("hello").as_str()));
    }

    #[test]
    fn test_failed_result_keeps_retryable_flag() {
        let result = ExtractionResult::failed(&ExtractionError::Cancelled, 1, Duration::ZERO);
        assert!(!result.success);
        assert!(!result.retryable);
        assert_eq!(result.error.as_deref(), Some("extraction cancelled"));
    }

    struct FlakyExtractor {
        failures_left: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl TextExtractor for FlakyExtractor {
        async fn extract(
            &self,
            _source: &str,
            _timeout: Duration,
        ) -> std::result::Result<ExtractedText, ExtractionError> {
            use std::sync::atomic::Ordering;
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(ExtractionError::NonZeroExit {
                    code: "1".to_string(),
                    stderr: "busy".to_string(),
                });
            }
            Ok(ExtractedText {
                text: "accessory dwelling unit".to_string(),
                metadata: ExtractionMetadata::default(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_extract_with_retry_backs_off_two_then_four_seconds() {
        let extractor = FlakyExtractor {
            failures_left: std::sync::atomic::AtomicU32::new(2),
        };
        let started = tokio::time::Instant::now();

        let result = extract_with_retry(
            &extractor,
            "/tmp/a.pdf",
            Duration::from_secs(60),
            &RetryPolicy::default(),
        )
        .await;

        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.text.as_deref(), Some("accessory dwelling unit"));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed < Duration::from_secs(7));
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use std::path::PathBuf;
        use tempfile::TempDir;

        fn script(dir: &TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("extract.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            path
        }

        fn client_for(path: &PathBuf) -> ExtractionClient {
            ExtractionClient::new("sh")
                .with_args(vec![path.display().to_string()])
                .with_timeout(Duration::from_secs(10))
                .with_retry(RetryPolicy::new(3, Duration::from_millis(10), 2.0))
        }

        #[tokio::test]
        async fn test_successful_extraction() {
            let dir = TempDir::new().unwrap();
            let path = script(
                &dir,
                r#"printf '{"success": true, "content_text": "%s %s %s %s", "metadata": {"extraction_method": "stub"}}' "$1" "$2" "$3" "$4""#,
            );

            let result = client_for(&path).extract_with_retry("/tmp/doc.pdf").await;

            assert!(result.success, "{:?}", result.error);
            assert_eq!(result.text.as_deref(), Some("--file /tmp/doc.pdf --timeout 10"));
            assert_eq!(result.attempts, 1);
            assert_eq!(result.metadata.unwrap().extraction_method, "stub");
            assert_eq!(result.content_hash.unwrap().len(), 64);
        }

        #[tokio::test]
        async fn test_fails_twice_then_succeeds() {
            let dir = TempDir::new().unwrap();
            let counter = dir.path().join("count");
            let path = script(
                &dir,
                &format!(
                    r#"n=$(cat "{c}" 2>/dev/null || echo 0)
n=$((n + 1))
echo "$n" > "{c}"
if [ "$n" -lt 3 ]; then echo "boom" >&2; exit 1; fi
echo '{{"success": true, "content_text": "third time"}}'"#,
                    c = counter.display()
                ),
            );

            let result = client_for(&path).extract_with_retry("/tmp/doc.pdf").await;

            assert!(result.success, "{:?}", result.error);
            assert_eq!(result.attempts, 3);
            assert_eq!(result.text.as_deref(), Some("third time"));
        }

        #[tokio::test]
        async fn test_malformed_output_fails_every_attempt() {
            let dir = TempDir::new().unwrap();
            let path = script(&dir, "echo not json");

            let result = client_for(&path).extract_with_retry("/tmp/doc.pdf").await;

            assert!(!result.success);
            assert_eq!(result.attempts, 3);
            assert!(result.error.unwrap().contains("malformed"));
        }

        #[tokio::test]
        async fn test_tool_reported_failure() {
            let dir = TempDir::new().unwrap();
            let path = script(&dir, r#"echo '{"success": false, "error": "encrypted pdf"}'"#);

            let err = client_for(&path)
                .extract("/tmp/doc.pdf", Duration::from_secs(5))
                .await
                .unwrap_err();
            assert!(matches!(err, ExtractionError::ToolReported(ref m) if m == "encrypted pdf"));
        }

        #[tokio::test]
        async fn test_non_zero_exit_captures_stderr() {
            let dir = TempDir::new().unwrap();
            let path = script(&dir, "echo 'no such file' >&2; exit 2");

            let err = client_for(&path)
                .extract("/tmp/doc.pdf", Duration::from_secs(5))
                .await
                .unwrap_err();
            match err {
                ExtractionError::NonZeroExit { code, stderr } => {
                    assert_eq!(code, "2");
                    assert_eq!(stderr, "no such file");
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn test_timeout_terminates_process() {
            let dir = TempDir::new().unwrap();
            let path = script(&dir, "exec sleep 30");
            let client = client_for(&path).with_retry(RetryPolicy::once());

            let started = Instant::now();
            let err = client
                .extract("/tmp/doc.pdf", Duration::from_millis(200))
                .await
                .unwrap_err();

            assert!(matches!(err, ExtractionError::Timeout(_)));
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[tokio::test]
        async fn test_missing_tool_is_not_retried() {
            let client = ExtractionClient::new("definitely-not-an-extractor-binary")
                .with_retry(RetryPolicy::new(3, Duration::from_millis(10), 2.0));

            let result = client.extract_with_retry("/tmp/doc.pdf").await;

            assert!(!result.success);
            assert!(!result.retryable);
            assert_eq!(result.attempts, 1);
        }
    }
}
