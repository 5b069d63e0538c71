use crate::config::{AppSettings, DEFAULT_JAVA_MEMORY};
use crate::error::ServerError;
use crate::events::{AppEvent, EventSink, OutputStream};
use crate::logs;
use crate::players::{parse_player_event, OnlinePlayers};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, watch, Mutex};

/// Placeholder jar for a server registered before any JAR was chosen.
pub const DOWNLOAD_LATER: &str = "DOWNLOAD_LATER";
pub const EULA_FILE: &str = "eula.txt";
pub const EULA_ERROR_MESSAGE: &str = "You need to agree to the EULA in order to run the server.";
const EULA_HEADER: &str = "#By changing the setting below to TRUE you are indicating your agreement to our EULA (https://account.mojang.com/documents/minecraft_eula).";
const DEFAULT_JAR_ARGS: &[&str] = &["nogui"];

fn default_jar() -> String {
    DOWNLOAD_LATER.to_string()
}

fn default_memory() -> String {
    DEFAULT_JAVA_MEMORY.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default = "default_jar")]
    pub jar: String,
    #[serde(default)]
    pub resource_pack: String,
    #[serde(default)]
    pub resource_pack_sha1: String,
    #[serde(default = "default_memory")]
    pub memory: String,
}

impl ServerRecord {
    pub fn new(name: &str, path: impl Into<PathBuf>, jar: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            jar: jar.to_string(),
            resource_pack: String::new(),
            resource_pack_sha1: String::new(),
            memory: default_memory(),
        }
    }

    pub fn has_jar_file(&self) -> bool {
        self.jar != DOWNLOAD_LATER
    }

    pub fn jar_path(&self) -> PathBuf {
        self.path.join(&self.jar)
    }
}

struct RunningServer {
    name: String,
    generation: u64,
    pid: Option<u32>,
    stdin: Arc<Mutex<ChildStdin>>,
    kill: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
    online: Arc<std::sync::Mutex<OnlinePlayers>>,
}

#[derive(Clone)]
struct OutputContext {
    server: String,
    events: EventSink,
    eula_prompted: Arc<AtomicBool>,
    online: Arc<std::sync::Mutex<OnlinePlayers>>,
}

/// A server directory is reserved as `Starting` before any await in `start`,
/// so a second start for the same directory is refused.
enum ProcessSlot {
    Starting(u64),
    Running(RunningServer),
}

impl ProcessSlot {
    fn generation(&self) -> u64 {
        match self {
            ProcessSlot::Starting(generation) => *generation,
            ProcessSlot::Running(running) => running.generation,
        }
    }

    fn running(&self) -> Option<&RunningServer> {
        match self {
            ProcessSlot::Running(running) => Some(running),
            ProcessSlot::Starting(_) => None,
        }
    }

    fn running_mut(&mut self) -> Option<&mut RunningServer> {
        match self {
            ProcessSlot::Running(running) => Some(running),
            ProcessSlot::Starting(_) => None,
        }
    }
}

type ProcessMap = Arc<std::sync::Mutex<HashMap<PathBuf, ProcessSlot>>>;

fn lock_processes(
    processes: &ProcessMap,
) -> std::sync::MutexGuard<'_, HashMap<PathBuf, ProcessSlot>> {
    processes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes the slot only if it still belongs to `generation`.
fn release_slot(processes: &ProcessMap, path: &Path, generation: u64) {
    let mut processes = lock_processes(processes);
    if processes.get(path).map(ProcessSlot::generation) == Some(generation) {
        processes.remove(path);
    }
}

/// Holds a `Starting` slot and releases it on drop unless the start completed.
struct StartReservation {
    processes: ProcessMap,
    path: PathBuf,
    generation: u64,
    committed: bool,
}

impl StartReservation {
    fn acquire(
        processes: &ProcessMap,
        path: &Path,
        generation: u64,
        name: &str,
    ) -> Result<Self, ServerError> {
        let mut slots = lock_processes(processes);
        if slots.contains_key(path) {
            return Err(ServerError::AlreadyRunning(name.to_string()));
        }
        slots.insert(path.to_path_buf(), ProcessSlot::Starting(generation));
        Ok(Self {
            processes: processes.clone(),
            path: path.to_path_buf(),
            generation,
            committed: false,
        })
    }

    fn commit(mut self, running: RunningServer) {
        lock_processes(&self.processes).insert(self.path.clone(), ProcessSlot::Running(running));
        self.committed = true;
    }
}

impl Drop for StartReservation {
    fn drop(&mut self) {
        if !self.committed {
            release_slot(&self.processes, &self.path, self.generation);
        }
    }
}

/// Registered servers plus the child processes of those currently running.
/// Processes are keyed by server directory.
pub struct ServerManager {
    servers: Arc<Mutex<Vec<ServerRecord>>>,
    processes: ProcessMap,
    next_generation: AtomicU64,
    config_path: PathBuf,
    settings: AppSettings,
    events: EventSink,
}

impl ServerManager {
    pub fn new(config_path: PathBuf, settings: AppSettings, events: EventSink) -> Self {
        Self {
            servers: Arc::new(Mutex::new(Vec::new())),
            processes: Arc::new(std::sync::Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            config_path,
            settings,
            events,
        }
    }

    /// Load servers from JSON file
    pub async fn load(&self) -> Result<usize> {
        let server_list: Vec<ServerRecord> = if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)
                .await
                .with_context(|| format!("Failed to read {}", self.config_path.display()))?;
            serde_json::from_str(&content).context("Error loading servers")?
        } else {
            Vec::new()
        };

        let count = server_list.len();
        *self.servers.lock().await = server_list;
        self.events
            .log(format!("Loaded {} servers from configuration.\n", count));
        Ok(count)
    }

    /// Save servers to JSON file
    pub async fn save(&self) -> Result<()> {
        let content = {
            let servers = self.servers.lock().await;
            serde_json::to_string_pretty(&*servers)?
        };

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&self.config_path, content)
            .await
            .context("Error saving server configurations")?;
        tracing::debug!("Server configurations saved to {}", self.config_path.display());
        Ok(())
    }

    pub async fn add(&self, name: &str, path: &Path, jar: Option<&str>) -> Result<ServerRecord> {
        let name = name.trim();
        if name.is_empty() || path.as_os_str().is_empty() {
            return Err(ServerError::InvalidRecord.into());
        }

        let jar = jar.map(str::trim).filter(|j| !j.is_empty()).unwrap_or(DOWNLOAD_LATER);
        let mut record = ServerRecord::new(name, path, jar);
        record.memory = self.settings.default_memory.clone();

        {
            let mut servers = self.servers.lock().await;
            if servers.iter().any(|s| s.name == name) {
                return Err(ServerError::DuplicateName(name.to_string()).into());
            }
            servers.push(record.clone());
        }

        self.events.log(format!(
            "Added server: {} at {} using {}\n",
            name,
            path.display(),
            jar
        ));
        self.save().await?;
        Ok(record)
    }

    pub async fn list(&self) -> Vec<ServerRecord> {
        self.servers.lock().await.clone()
    }

    pub async fn find_by_name(&self, name: &str) -> Option<ServerRecord> {
        self.servers
            .lock()
            .await
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    pub async fn find_by_path(&self, path: &Path) -> Option<ServerRecord> {
        self.servers
            .lock()
            .await
            .iter()
            .find(|s| s.path == path)
            .cloned()
    }

    pub async fn get(&self, name: &str) -> Result<ServerRecord> {
        self.find_by_name(name)
            .await
            .ok_or_else(|| ServerError::NotFound(name.to_string()).into())
    }

    async fn modify<F>(&self, name: &str, change: F) -> Result<ServerRecord>
    where
        F: FnOnce(&mut ServerRecord),
    {
        let updated = {
            let mut servers = self.servers.lock().await;
            let server = servers
                .iter_mut()
                .find(|s| s.name == name)
                .ok_or_else(|| ServerError::NotFound(name.to_string()))?;
            change(server);
            server.clone()
        };
        self.save().await?;
        Ok(updated)
    }

    pub async fn update_jar(&self, name: &str, jar: &str) -> Result<ServerRecord> {
        let jar = jar.to_string();
        self.modify(name, move |s| s.jar = jar).await
    }

    pub async fn set_memory(&self, name: &str, memory: &str) -> Result<ServerRecord> {
        let memory = memory.trim().to_string();
        if memory.is_empty() {
            anyhow::bail!("Memory value cannot be empty");
        }
        self.modify(name, move |s| s.memory = memory).await
    }

    pub async fn set_resource_pack(&self, name: &str, url: &str, sha1: &str) -> Result<ServerRecord> {
        let (url, sha1) = (url.to_string(), sha1.to_string());
        self.modify(name, move |s| {
            s.resource_pack = url;
            s.resource_pack_sha1 = sha1;
        })
        .await
    }

    /// Unregisters a server, killing it first if running. Files stay on disk.
    pub async fn remove(&self, name: &str) -> Result<ServerRecord> {
        let record = self.get(name).await?;
        if self.is_running(&record.path) {
            self.kill(name).await?;
        }

        self.servers.lock().await.retain(|s| s.name != name);
        self.events
            .log(format!("Server '{}' removed from management.\n", name));
        self.save().await?;
        Ok(record)
    }

    /// Unregisters a server and deletes its directory.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let record = self.remove(name).await?;

        if record.path.exists() {
            fs::remove_dir_all(&record.path)
                .await
                .context("Failed to delete server directory")?;
        }
        self.events.log(format!(
            "Deleted server directory {}\n",
            record.path.display()
        ));
        Ok(())
    }

    pub async fn log_files(&self, name: &str) -> Result<Vec<PathBuf>> {
        let record = self.get(name).await?;
        logs::log_files(&record.path).await
    }

    /// True once the process is spawned; a start still in progress does not count.
    pub fn is_running(&self, server_path: &Path) -> bool {
        lock_processes(&self.processes)
            .get(server_path)
            .and_then(ProcessSlot::running)
            .is_some()
    }

    pub fn running_pid(&self, server_path: &Path) -> Option<u32> {
        lock_processes(&self.processes)
            .get(server_path)
            .and_then(ProcessSlot::running)
            .and_then(|p| p.pid)
    }

    /// (server name, pid) for every running server.
    pub fn running_pids(&self) -> Vec<(String, u32)> {
        lock_processes(&self.processes)
            .values()
            .filter_map(ProcessSlot::running)
            .filter_map(|p| p.pid.map(|pid| (p.name.clone(), pid)))
            .collect()
    }

    pub fn online_players(&self, server_path: &Path) -> Vec<String> {
        lock_processes(&self.processes)
            .get(server_path)
            .and_then(ProcessSlot::running)
            .map(|p| {
                p.online
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .names()
            })
            .unwrap_or_default()
    }

    pub async fn accept_eula(&self, name: &str) -> Result<()> {
        let record = self.get(name).await?;
        write_eula_accepted(&record.path).await?;
        self.events
            .log(format!("EULA accepted for server '{}'.\n", name));
        Ok(())
    }

    pub async fn start(&self, name: &str) -> Result<()> {
        let record = self.get(name).await?;

        if !record.has_jar_file() {
            return Err(ServerError::NoJar.into());
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let reservation =
            StartReservation::acquire(&self.processes, &record.path, generation, &record.name)?;

        match eula_accepted(&record.path).await {
            Ok(true) => {}
            Ok(false) => return Err(ServerError::EulaNotAccepted(record.name).into()),
            Err(e) => {
                self.events.log(format!("Error reading eula.txt: {:#}\n", e));
                return Err(ServerError::EulaNotAccepted(record.name).into());
            }
        }
        let jar_path = record.jar_path();
        if !jar_path.exists() {
            return Err(ServerError::JarMissing(jar_path).into());
        }

        self.events.log(format!(
            "Starting server '{}' using {}...\n",
            record.name, record.jar
        ));

        let java_cmd = self.settings.java_command();
        let mut child = match Command::new(&java_cmd)
            .args(launch_args(&record))
            .current_dir(&record.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                self.events.log(format!("Failed to start server: {}\n", e));
                return Err(anyhow::Error::new(e).context(format!(
                    "Failed to launch {}",
                    java_cmd.display()
                )));
            }
        };

        let pid = child.id();
        let stdin = child.stdin.take().context("Server stdin not available")?;
        let stdout = child.stdout.take().context("Server stdout not available")?;
        let stderr = child.stderr.take().context("Server stderr not available")?;

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(false);
        let online = Arc::new(std::sync::Mutex::new(OnlinePlayers::default()));

        reservation.commit(RunningServer {
            name: record.name.clone(),
            generation,
            pid,
            stdin: Arc::new(Mutex::new(stdin)),
            kill: Some(kill_tx),
            exited: exited_rx,
            online: online.clone(),
        });

        let pid_text = pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string());
        self.events.log(format!(
            "Server '{}' started. PID: {}\n",
            record.name, pid_text
        ));
        self.events.emit(AppEvent::ServerStarted {
            server: record.name.clone(),
            pid,
        });

        let ctx = OutputContext {
            server: record.name.clone(),
            events: self.events.clone(),
            eula_prompted: Arc::new(AtomicBool::new(false)),
            online,
        };
        spawn_output_reader(stdout, OutputStream::Stdout, ctx.clone());
        spawn_output_reader(stderr, OutputStream::Stderr, ctx);
        spawn_exit_watcher(
            child,
            kill_rx,
            exited_tx,
            record,
            generation,
            self.processes.clone(),
            self.events.clone(),
        );

        Ok(())
    }

    /// Asks the server to shut down via its console. Falls back to a kill
    /// only when the command cannot be written.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let record = self.get(name).await?;
        let stdin = self.stdin_of(&record)?;

        self.events
            .log(format!("Stopping server '{}'...\n", record.name));
        if let Err(e) = write_line(&stdin, "stop").await {
            self.events.log(format!(
                "Error sending stop command: {:#}. Terminating process.\n",
                e
            ));
            return self.kill(name).await;
        }
        Ok(())
    }

    pub async fn kill(&self, name: &str) -> Result<()> {
        let record = self.get(name).await?;
        let kill = {
            let mut processes = lock_processes(&self.processes);
            let running = processes
                .get_mut(&record.path)
                .and_then(ProcessSlot::running_mut)
                .ok_or_else(|| ServerError::NotRunning(record.name.clone()))?;
            running.kill.take()
        };

        self.events.log(format!(
            "Terminating server '{}'...\n",
            record.name
        ));
        match kill {
            Some(tx) => {
                // Err means the exit watcher already finished.
                let _ = tx.send(());
            }
            None => tracing::debug!("Kill already requested for '{}'", record.name),
        }
        Ok(())
    }

    /// Send a command to a running server
    pub async fn send_command(&self, name: &str, command: &str) -> Result<()> {
        let record = self.get(name).await?;
        let stdin = self.stdin_of(&record)?;
        write_line(&stdin, command).await?;
        tracing::info!("Sent command to server {}: {}", record.name, command.trim());
        Ok(())
    }

    /// Stops, waits for the exit up to the configured timeout, then starts again.
    /// A server that does not exit in time is left running.
    pub async fn restart(&self, name: &str) -> Result<()> {
        let record = self.get(name).await?;

        let exited = lock_processes(&self.processes)
            .get(&record.path)
            .and_then(ProcessSlot::running)
            .map(|p| p.exited.clone());

        if let Some(mut exited) = exited {
            self.stop(name).await?;
            let timeout = Duration::from_secs(self.settings.restart_timeout_secs);
            let stopped = tokio::time::timeout(timeout, exited.wait_for(|done| *done))
                .await
                .is_ok();
            if !stopped {
                anyhow::bail!(
                    "Server '{}' did not stop within {} seconds; restart aborted",
                    name,
                    timeout.as_secs()
                );
            }
        }

        self.start(name).await
    }

    fn stdin_of(&self, record: &ServerRecord) -> Result<Arc<Mutex<ChildStdin>>> {
        lock_processes(&self.processes)
            .get(&record.path)
            .and_then(ProcessSlot::running)
            .map(|p| p.stdin.clone())
            .ok_or_else(|| ServerError::NotRunning(record.name.clone()).into())
    }
}

fn launch_args(record: &ServerRecord) -> Vec<String> {
    let mut args = vec![
        format!("-Xmx{}", record.memory),
        format!("-Xms{}", record.memory),
        "-jar".to_string(),
        record.jar.clone(),
    ];
    args.extend(DEFAULT_JAR_ARGS.iter().map(|a| a.to_string()));
    args
}

async fn write_line(stdin: &Mutex<ChildStdin>, command: &str) -> Result<()> {
    let command_line = format!("{}\n", command.trim());
    let mut stdin = stdin.lock().await;
    stdin
        .write_all(command_line.as_bytes())
        .await
        .context("Failed to write command to server")?;
    stdin
        .flush()
        .await
        .context("Failed to flush command to server")?;
    Ok(())
}

fn spawn_output_reader<R>(stream: R, kind: OutputStream, ctx: OutputContext)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    let text = text.trim_end_matches(['\r', '\n']);
                    let line = match kind {
                        OutputStream::Stdout => text.to_string(),
                        OutputStream::Stderr => format!("[STDERR] {}", text),
                    };
                    handle_output_line(&ctx, line, kind);
                }
                Err(e) => {
                    ctx.events
                        .log(format!("Error reading {}: {}\n", kind, e));
                    break;
                }
            }
        }
    });
}

fn handle_output_line(ctx: &OutputContext, line: String, kind: OutputStream) {
    let eula_hit =
        line.contains(EULA_ERROR_MESSAGE) && !ctx.eula_prompted.swap(true, Ordering::SeqCst);

    let players_changed = match parse_player_event(&line) {
        Some(event) => {
            let mut online = ctx.online.lock().unwrap_or_else(|p| p.into_inner());
            online.apply(&event).then(|| online.names())
        }
        None => None,
    };

    ctx.events.emit(AppEvent::ServerOutput {
        server: ctx.server.clone(),
        line,
        stream: kind,
    });

    if eula_hit {
        ctx.events.emit(AppEvent::EulaRequired {
            server: ctx.server.clone(),
        });
    }
    if let Some(online) = players_changed {
        ctx.events.emit(AppEvent::PlayersChanged {
            server: ctx.server.clone(),
            online,
        });
    }
}

fn spawn_exit_watcher(
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    exited_tx: watch::Sender<bool>,
    record: ServerRecord,
    generation: u64,
    processes: ProcessMap,
    events: EventSink,
) {
    tokio::spawn(async move {
        let finished = tokio::select! {
            status = child.wait() => Some(status),
            Ok(()) = &mut kill_rx => None,
        };

        let status = match finished {
            Some(status) => status,
            None => {
                if let Err(e) = terminate(&mut child) {
                    tracing::warn!("Failed to terminate server '{}': {}", record.name, e);
                }
                child.wait().await
            }
        };

        let exit_code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::warn!("Failed waiting on server '{}': {}", record.name, e);
                None
            }
        };

        release_slot(&processes, &record.path, generation);
        let _ = exited_tx.send(true);

        let code_text = exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        events.log(format!(
            "Server '{}' stopped. Exit code: {}\n",
            record.name, code_text
        ));
        events.emit(AppEvent::ServerStopped {
            server: record.name.clone(),
            exit_code,
        });
    });
}

/// Sends SIGTERM so the server runs its shutdown hook and saves the world.
#[cfg(unix)]
fn terminate(child: &mut Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        // Already reaped.
        return Ok(());
    };
    let pid = libc::pid_t::try_from(pid)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    // SAFETY: kill(2) has no memory-safety preconditions; the pid is our own unreaped child.
    if unsafe { libc::kill(pid, libc::SIGTERM) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

/// False when `eula.txt` contains `eula=false`. A missing file does not block a start;
/// the server writes one itself and refuses to run, which surfaces as an `EulaRequired` event.
pub async fn eula_accepted(server_path: &Path) -> Result<bool> {
    let eula_path = server_path.join(EULA_FILE);
    if !eula_path.exists() {
        return Ok(true);
    }
    let content = fs::read_to_string(&eula_path)
        .await
        .with_context(|| format!("Failed to read {}", eula_path.display()))?;
    Ok(!content.contains("eula=false"))
}

pub async fn write_eula_accepted(server_path: &Path) -> Result<()> {
    let eula_path = server_path.join(EULA_FILE);

    let content = if eula_path.exists() {
        let existing = fs::read_to_string(&eula_path).await?;
        let mut out = String::new();
        for line in existing.lines() {
            if line.trim() == "eula=false" {
                out.push_str("eula=true");
            } else {
                out.push_str(line);
            }
            out.push('\n');
        }
        out
    } else {
        format!("{}\neula=true\n", EULA_HEADER)
    };

    fs::write(&eula_path, content)
        .await
        .context("Error accepting EULA")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &Path) -> ServerManager {
        ServerManager::new(
            dir.join("servers.json"),
            AppSettings::default(),
            EventSink::silent(),
        )
    }

    #[test]
    fn launch_args_match_expected_command() {
        let mut record = ServerRecord::new("s", "/srv/s", "paper.jar");
        record.memory = "2G".to_string();
        assert_eq!(
            launch_args(&record),
            vec!["-Xmx2G", "-Xms2G", "-jar", "paper.jar", "nogui"]
        );
    }

    #[test]
    fn record_defaults_on_load() {
        let record: ServerRecord =
            serde_json::from_str(r#"{"name":"lobby","path":"/srv/lobby"}"#).unwrap();
        assert_eq!(record.jar, DOWNLOAD_LATER);
        assert!(!record.has_jar_file());
        assert_eq!(record.memory, "1024M");
        assert_eq!(record.resource_pack, "");
    }

    #[tokio::test]
    async fn start_refuses_without_jar() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.add("lobby", &dir.path().join("lobby"), None).await.unwrap();

        let err = manager.start("lobby").await.unwrap_err();
        assert_eq!(err.downcast_ref::<ServerError>(), Some(&ServerError::NoJar));
    }

    #[tokio::test]
    async fn start_refuses_when_eula_false() {
        let dir = tempfile::tempdir().unwrap();
        let server_dir = dir.path().join("lobby");
        std::fs::create_dir_all(&server_dir).unwrap();
        std::fs::write(server_dir.join("eula.txt"), "eula=false\n").unwrap();
        std::fs::write(server_dir.join("paper.jar"), b"").unwrap();

        let manager = manager(dir.path());
        manager.add("lobby", &server_dir, Some("paper.jar")).await.unwrap();

        let err = manager.start("lobby").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ServerError>(),
            Some(&ServerError::EulaNotAccepted("lobby".to_string()))
        );
    }

    #[tokio::test]
    async fn start_refuses_when_jar_missing() {
        let dir = tempfile::tempdir().unwrap();
        let server_dir = dir.path().join("lobby");
        std::fs::create_dir_all(&server_dir).unwrap();

        let manager = manager(dir.path());
        manager.add("lobby", &server_dir, Some("gone.jar")).await.unwrap();

        let err = manager.start("lobby").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ServerError>(),
            Some(&ServerError::JarMissing(server_dir.join("gone.jar")))
        );
    }

    #[tokio::test]
    async fn stop_and_kill_require_running_server() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.add("lobby", &dir.path().join("lobby"), None).await.unwrap();

        for err in [
            manager.stop("lobby").await.unwrap_err(),
            manager.kill("lobby").await.unwrap_err(),
            manager.send_command("lobby", "say hi").await.unwrap_err(),
        ] {
            assert_eq!(
                err.downcast_ref::<ServerError>(),
                Some(&ServerError::NotRunning("lobby".to_string()))
            );
        }
    }

    #[tokio::test]
    async fn accept_eula_flips_existing_flag() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("eula.txt"), "#header\neula=false\n").unwrap();

        write_eula_accepted(dir.path()).await.unwrap();
        let content = std::fs::read_to_string(dir.path().join("eula.txt")).unwrap();
        assert_eq!(content, "#header\neula=true\n");
        assert!(eula_accepted(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn accept_eula_creates_file_with_header() {
        let dir = tempfile::tempdir().unwrap();
        write_eula_accepted(dir.path()).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("eula.txt")).unwrap();
        assert!(content.starts_with("#By changing the setting below to TRUE"));
        assert!(content.ends_with("eula=true\n"));
    }

    #[test]
    fn eula_prompt_fires_once_per_run() {
        let (events, mut rx) = EventSink::channel();
        let ctx = OutputContext {
            server: "lobby".to_string(),
            events,
            eula_prompted: Arc::new(AtomicBool::new(false)),
            online: Arc::new(std::sync::Mutex::new(OnlinePlayers::default())),
        };

        let line = format!("[12:00:00] [main/INFO]: {}", EULA_ERROR_MESSAGE);
        handle_output_line(&ctx, line.clone(), OutputStream::Stdout);
        handle_output_line(&ctx, line, OutputStream::Stdout);

        let mut prompts = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AppEvent::EulaRequired { .. }) {
                prompts += 1;
            }
        }
        assert_eq!(prompts, 1);
    }

    #[test]
    fn join_lines_emit_player_changes() {
        let (events, mut rx) = EventSink::channel();
        let ctx = OutputContext {
            server: "lobby".to_string(),
            events,
            eula_prompted: Arc::new(AtomicBool::new(false)),
            online: Arc::new(std::sync::Mutex::new(OnlinePlayers::default())),
        };

        handle_output_line(
            &ctx,
            "[12:00:00] [Server thread/INFO]: Steve joined the game".to_string(),
            OutputStream::Stdout,
        );

        let events: Vec<AppEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events.contains(&AppEvent::PlayersChanged {
            server: "lobby".to_string(),
            online: vec!["Steve".to_string()],
        }));
    }
}
