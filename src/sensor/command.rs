//! External-program sensor driver.
//!
//! Runs `<program> <kind> <pin>` and expects a single JSON object on stdout:
//!
//! ```text
//! {"humidity": 45.2, "temperature": 20.0}
//! ```
//!
//! `null` for either field means the helper could not get a valid reading.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{RawReading, RetryPolicy, SensorDriver, SensorKind};
use crate::error::SensorError;

/// A driver that shells out to a helper program for each attempt.
#[derive(Debug)]
pub struct CommandDriver {
    program: String,
    policy: RetryPolicy,
    description: String,
}

impl CommandDriver {
    pub fn new(program: impl Into<String>, policy: RetryPolicy) -> Self {
        let program = program.into();
        let description = format!("command: {}", program);
        Self {
            program,
            policy,
            description,
        }
    }

    async fn attempt(program: &str, kind: SensorKind, pin: u32) -> Result<RawReading, SensorError> {
        let output = Command::new(program)
            .arg(kind.as_str())
            .arg(pin.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SensorError::Driver(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        parse_output(&output.stdout)
    }
}

/// Parse the helper's stdout into a raw reading.
fn parse_output(stdout: &[u8]) -> Result<RawReading, SensorError> {
    let text = String::from_utf8_lossy(stdout);
    let line = text.trim();
    if line.is_empty() {
        return Ok(RawReading::failed());
    }
    serde_json::from_str(line).map_err(|e| SensorError::Driver(format!("Parse error: {}", e)))
}

#[async_trait]
impl SensorDriver for CommandDriver {
    async fn read_retry(&mut self, kind: SensorKind, pin: u32) -> Result<RawReading, SensorError> {
        let program = self.program.as_str();
        self.policy
            .run(&self.description, || Self::attempt(program, kind, pin))
            .await
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 2,
            delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_parse_output() {
        let raw = parse_output(b"{\"humidity\": 45.2, \"temperature\": 20.0}\n").unwrap();
        assert_eq!(raw, RawReading::new(20.0, 45.2));

        let raw = parse_output(b"{\"humidity\": null, \"temperature\": null}").unwrap();
        assert!(!raw.is_complete());

        assert!(parse_output(b"").unwrap() == RawReading::failed());
        assert!(matches!(parse_output(b"45.2,20.0"), Err(SensorError::Driver(_))));
    }

    #[tokio::test]
    async fn test_missing_program_is_driver_error() {
        let mut driver = CommandDriver::new("/nonexistent/dht-read", quick_policy());
        assert_eq!(driver.description(), "command: /nonexistent/dht-read");

        let err = driver.read_retry(SensorKind::Dht22, 4).await.unwrap_err();
        assert!(matches!(err, SensorError::Driver(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reads_from_helper_script() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("dht-read");
        std::fs::write(
            &script,
            "#!/bin/sh\n[ \"$1\" = dht22 ] && [ \"$2\" = 17 ] || exit 3\necho '{\"humidity\": 51.5, \"temperature\": 22.25}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut driver = CommandDriver::new(script.to_string_lossy(), quick_policy());
        let raw = driver.read_retry(SensorKind::Dht22, 17).await.unwrap();
        assert_eq!(raw, RawReading::new(22.25, 51.5));

        // Wrong pin makes the helper fail on every attempt
        let err = driver.read_retry(SensorKind::Dht22, 4).await.unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }
}
