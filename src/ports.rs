use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortEntry {
    pub proto: String,
    pub state: String,
    pub local: String,
    pub remote: String,
    pub program: String,
    pub pid: Option<u32>,
}

static USERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"users:\(\("([^"]+)",pid=(\d+)"#).expect("users pattern is valid")
});

/// Listening sockets from `ss -tulpn` output that belong to one of `pids`.
/// Rows are de-duplicated by protocol, local address and PID.
pub fn parse_ss_output(output: &str, pids: &[u32]) -> Vec<PortEntry> {
    let markers: Vec<String> = pids.iter().map(|pid| format!("pid={},", pid)).collect();
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for line in output.lines() {
        if !markers.iter().any(|m| line.contains(m.as_str())) {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }

        let (program, pid) = USERS
            .captures(line)
            .map(|caps| (caps[1].to_string(), caps[2].parse::<u32>().ok()))
            .unwrap_or_default();

        let entry = PortEntry {
            proto: parts[0].to_string(),
            state: parts[1].to_string(),
            local: parts[4].to_string(),
            remote: parts[5].to_string(),
            program,
            pid,
        };
        if seen.insert((entry.proto.clone(), entry.local.clone(), entry.pid)) {
            entries.push(entry);
        }
    }
    entries
}

/// Runs `ss -tulpn` and returns the sockets held by the given server PIDs.
pub async fn analyze(pids: &[u32]) -> Result<Vec<PortEntry>> {
    if pids.is_empty() {
        return Ok(Vec::new());
    }

    let output = Command::new("ss")
        .arg("-tulpn")
        .output()
        .await
        .context("Failed to retrieve ports: could not run ss")?;
    if !output.status.success() {
        anyhow::bail!(
            "Failed to retrieve ports: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let entries = parse_ss_output(&String::from_utf8_lossy(&output.stdout), pids);
    tracing::debug!("Found {} listening sockets for {} servers", entries.len(), pids.len());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SS_OUTPUT: &str = "\
Netid State  Recv-Q Send-Q Local Address:Port  Peer Address:Port Process
udp   UNCONN 0      0            0.0.0.0:19132      0.0.0.0:*     users:((\"java\",pid=4242,fd=61))
tcp   LISTEN 0      50                 *:25565            *:*     users:((\"java\",pid=4242,fd=57))
tcp   LISTEN 0      50                 *:25565            *:*     users:((\"java\",pid=4242,fd=58))
tcp   LISTEN 0      128        127.0.0.1:631        0.0.0.0:*     users:((\"cupsd\",pid=812,fd=7))
tcp   LISTEN 0      50                 *:25575            *:*     users:((\"java\",pid=42420,fd=12))
";

    #[test]
    fn keeps_only_server_pids() {
        let entries = parse_ss_output(SS_OUTPUT, &[4242]);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].proto, "udp");
        assert_eq!(entries[0].local, "0.0.0.0:19132");
        assert_eq!(entries[1].state, "LISTEN");
        assert_eq!(entries[1].program, "java");
        assert_eq!(entries[1].pid, Some(4242));
    }

    #[test]
    fn multiple_pids() {
        let entries = parse_ss_output(SS_OUTPUT, &[4242, 42420]);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].local, "*:25575");
    }

    #[test]
    fn short_lines_are_skipped() {
        assert!(parse_ss_output("tcp LISTEN pid=1,", &[1]).is_empty());
    }

    #[tokio::test]
    async fn no_pids_means_no_scan() {
        assert!(analyze(&[]).await.unwrap().is_empty());
    }
}
