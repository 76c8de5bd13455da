//! Connect-test classification

use netdiag_tools::CommandResult;
use serde::{Deserialize, Serialize};

const REFUSED_MARKERS: [&str; 3] = ["connection refused", "connection reset", "no route to host"];
const TIMEOUT_MARKERS: [&str; 4] = ["connection timed out", "timed out", "timeout", "no response"];
const SUCCESS_MARKER: &str = "SUCCESS";

/// How a connection attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectOutcome {
    /// Actively rejected
    Refused,
    /// No answer
    Timeout,
    /// Connected
    Success,
    /// Could not tell
    Unknown,
}

impl ConnectOutcome {
    /// Lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refused => "refused",
            Self::Timeout => "timeout",
            Self::Success => "success",
            Self::Unknown => "unknown",
        }
    }
}

/// Connect-test signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectSignal {
    /// Classification
    pub error_type: ConnectOutcome,
    /// Confidence in the classification
    pub confidence: f64,
}

/// Classify a connect-test result. Refusal markers win over timeout markers.
#[must_use]
pub fn classify_connect(result: &CommandResult) -> ConnectSignal {
    let combined = result.combined_output();
    let lower = combined.to_lowercase();

    let (error_type, confidence) = if REFUSED_MARKERS.iter().any(|m| lower.contains(m)) {
        (ConnectOutcome::Refused, 0.95)
    } else if TIMEOUT_MARKERS.iter().any(|m| lower.contains(m)) {
        (ConnectOutcome::Timeout, 0.95)
    } else if result.exit_code == 0 && combined.contains(SUCCESS_MARKER) {
        (ConnectOutcome::Success, 1.0)
    } else {
        (ConnectOutcome::Unknown, 0.5)
    };

    ConnectSignal {
        error_type,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(stdout: &str, stderr: &str, exit_code: i32) -> ConnectSignal {
        classify_connect(
            &CommandResult::new("10.0.1.10", "telnet")
                .with_stdout(stdout)
                .with_stderr(stderr)
                .with_exit_code(exit_code),
        )
    }

    #[test]
    fn test_refused() {
        let signal = run("FAILED", "bash: connect: Connection refused", 0);
        assert_eq!(signal.error_type, ConnectOutcome::Refused);
        assert!(signal.confidence >= 0.9);
    }

    #[test]
    fn test_refused_beats_timeout() {
        let signal = run("", "Connection timed out\nConnection refused", 1);
        assert_eq!(signal.error_type, ConnectOutcome::Refused);
    }

    #[test]
    fn test_timeout() {
        let signal = run("FAILED", "bash: connect: Connection timed out", 124);
        assert_eq!(signal.error_type, ConnectOutcome::Timeout);
        assert_eq!(run("", "No response from peer", 1).error_type, ConnectOutcome::Timeout);
    }

    #[test]
    fn test_success_needs_zero_exit() {
        assert_eq!(run("SUCCESS", "", 0).error_type, ConnectOutcome::Success);
        assert_eq!(run("SUCCESS", "", 0).confidence, 1.0);
        assert_eq!(run("SUCCESS", "", 1).error_type, ConnectOutcome::Unknown);
    }

    #[test]
    fn test_unknown() {
        let signal = run("FAILED", "", 0);
        assert_eq!(signal.error_type, ConnectOutcome::Unknown);
        assert_eq!(signal.confidence, 0.5);
    }
}
