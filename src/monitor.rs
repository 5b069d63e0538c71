use crate::properties;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

const DEFAULT_MAX_PLAYERS: u32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_usage: f32,
    pub memory_used: u64,
    pub memory_total: u64,
    pub memory_percent: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStats {
    pub pid: u32,
    pub cpu_usage: f32,
    pub memory_used: u64,
    pub player_count: u32,
    pub max_players: u32,
}

pub struct Monitor {
    system: System,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    pub fn new() -> Self {
        Self {
            system: System::new_all(),
        }
    }

    /// Get overall system statistics
    pub fn get_system_stats(&mut self) -> SystemStats {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let total_memory = self.system.total_memory();
        let used_memory = self.system.used_memory();
        let memory_percent = if total_memory == 0 {
            0.0
        } else {
            (used_memory as f32 / total_memory as f32) * 100.0
        };

        SystemStats {
            cpu_usage: self.system.global_cpu_usage(),
            memory_used: used_memory,
            memory_total: total_memory,
            memory_percent,
        }
    }

    /// Statistics for a running server process. `None` once the process is gone.
    pub fn get_server_stats(&mut self, pid: u32, player_count: u32, max_players: u32) -> Option<ServerStats> {
        let sysinfo_pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sysinfo_pid]),
            true,
            ProcessRefreshKind::new().with_cpu().with_memory(),
        );

        self.system.process(sysinfo_pid).map(|process| ServerStats {
            pid,
            cpu_usage: process.cpu_usage(),
            memory_used: process.memory(),
            player_count,
            max_players,
        })
    }
}

/// `max-players` from server.properties, 20 when unset or unreadable.
pub async fn max_players(server_path: &Path) -> Result<u32> {
    let props = properties::read(server_path).await?;
    Ok(props
        .get("max-players")
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_MAX_PLAYERS))
}

pub fn format_bytes(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    let mib = bytes as f64 / MIB;
    if mib >= 1024.0 {
        format!("{:.1} GiB", mib / 1024.0)
    } else {
        format!("{:.0} MiB", mib)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn max_players_defaults_and_reads() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(max_players(dir.path()).await.unwrap(), 20);

        std::fs::write(dir.path().join("server.properties"), "max-players=64\n").unwrap();
        assert_eq!(max_players(dir.path()).await.unwrap(), 64);

        std::fs::write(dir.path().join("server.properties"), "max-players=lots\n").unwrap();
        assert_eq!(max_players(dir.path()).await.unwrap(), 20);
    }

    #[test]
    fn own_process_has_stats() {
        let mut monitor = Monitor::new();
        let stats = monitor.get_server_stats(std::process::id(), 1, 20).unwrap();
        assert_eq!(stats.pid, std::process::id());
        assert!(stats.memory_used > 0);
        assert!(monitor.get_system_stats().memory_total > 0);
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_bytes(512 * 1024 * 1024), "512 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }
}
