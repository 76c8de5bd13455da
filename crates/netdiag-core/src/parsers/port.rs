//! Listening-socket check

use netdiag_tools::CommandResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static PROCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"users:\(\("([^"]+)",pid=(\d+)"#).expect("PROCESS is a compile-time constant")
});

/// Listening status of a port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortStatus {
    /// Port checked
    pub port: u16,
    /// Whether a socket listens on it
    pub is_listening: bool,
    /// Owning process name
    pub process_name: Option<String>,
    /// Owning process id
    pub pid: Option<u32>,
    /// Local bind address, `*` when unspecified, empty when not listening
    pub bind_address: String,
}

impl PortStatus {
    fn closed(port: u16) -> Self {
        Self {
            port,
            is_listening: false,
            process_name: None,
            pid: None,
            bind_address: String::new(),
        }
    }
}

/// Look for a TCP LISTEN socket bound to `port` in `ss -tunlp` output
#[must_use]
pub fn parse_port_listen(result: &CommandResult, port: u16) -> PortStatus {
    let Ok(listen) = Regex::new(&format!(r"tcp\s+LISTEN\s+.*?[*:]{port}\s")) else {
        return PortStatus::closed(port);
    };
    let Ok(bind) = Regex::new(&format!(r"\s(\S+):{port}\s")) else {
        return PortStatus::closed(port);
    };

    let Some(line) = result
        .stdout
        .lines()
        .map(|l| format!("{l} "))
        .find(|l| listen.is_match(l))
    else {
        return PortStatus::closed(port);
    };

    let (process_name, pid) = PROCESS
        .captures(&line)
        .map(|c| (Some(c[1].to_string()), c[2].parse().ok()))
        .unwrap_or((None, None));

    let bind_address = bind
        .captures(&line)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "*".to_string());

    PortStatus {
        port,
        is_listening: true,
        process_name,
        pid,
        bind_address,
    }
}
