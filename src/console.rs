use crate::config_editor::{self, ConfigDocument};
use crate::events::AppEvent;
use crate::java_manager::java_version_for_mc;
use crate::monitor::{self, format_bytes};
use crate::players::{self, PlayerList, PlayerRegistry, DEFAULT_BAN_REASON, DEFAULT_OP_LEVEL};
use crate::plugins::{InstallFilter, PluginKind, PluginSource};
use crate::{logs, ports, AppState};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const LOG_TAIL_LINES: usize = 100;

const USAGE: &[(&str, &str)] = &[
    ("help", "help"),
    ("list", "list"),
    ("add", "add <name> <path> [jar]"),
    ("remove", "remove <server>"),
    ("delete", "delete <server>"),
    ("start", "start <server>"),
    ("stop", "stop <server>"),
    ("kill", "kill <server>"),
    ("restart", "restart <server>"),
    ("cmd", "cmd <server> <line...>"),
    ("eula", "eula <server>"),
    ("memory", "memory <server> <size>"),
    ("versions", "versions"),
    ("download", "download <server> [version]"),
    ("plugins", "plugins <server>"),
    ("search", "search <modrinth|spigot|curseforge> <query...>"),
    ("install", "install <server> <source> <id> [game-version] [loader]"),
    ("add-plugin", "add-plugin <server> <file> [plugin|mod]"),
    ("rm-plugin", "rm-plugin <server> <name>"),
    ("players", "players <server>"),
    ("whitelist", "whitelist <server> [add|remove <player>]"),
    ("op", "op <server> [add <player> [level]|remove <player>]"),
    ("ban", "ban <server> [add <player> [reason...]|remove <player>]"),
    ("packs", "packs <server>"),
    ("pack-download", "pack-download <server> <url>"),
    ("pack-activate", "pack-activate <server> <file>"),
    ("pack-deactivate", "pack-deactivate <server>"),
    ("configs", "configs <server>"),
    ("config-get", "config-get <server> <file> [key]"),
    ("config-set", "config-set <server> <file> <key> <value...>"),
    ("logs", "logs <server>"),
    ("log", "log <server> [file]"),
    ("ports", "ports"),
    ("java", "java [minecraft-version]"),
    ("stats", "stats [server]"),
    ("quit", "quit"),
];

/// Splits a console line on whitespace. Single and double quotes group
/// words; a backslash escapes the next character.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (_, '\\') => {
                let escaped = chars.next().context("Trailing backslash")?;
                current.push(escaped);
                in_token = true;
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        anyhow::bail!("Unterminated quote");
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    Show,
    Add { player: String, extra: Option<String> },
    Remove { player: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    List,
    Add { name: String, path: PathBuf, jar: Option<String> },
    Remove { server: String },
    Delete { server: String },
    Start { server: String },
    Stop { server: String },
    Kill { server: String },
    Restart { server: String },
    Cmd { server: String, line: String },
    Eula { server: String },
    Memory { server: String, memory: String },
    Versions,
    Download { server: String, version: Option<String> },
    Plugins { server: String },
    Search { source: PluginSource, query: String },
    Install { server: String, source: PluginSource, id: String, filter: InstallFilter },
    AddPlugin { server: String, file: PathBuf, kind: Option<PluginKind> },
    RmPlugin { server: String, name: String },
    Players { server: String },
    PlayerList { list: PlayerList, server: String, action: PlayerAction },
    Packs { server: String },
    PackDownload { server: String, url: String },
    PackActivate { server: String, file: String },
    PackDeactivate { server: String },
    Configs { server: String },
    ConfigGet { server: String, file: String, key: Option<String> },
    ConfigSet { server: String, file: String, key: String, value: String },
    Logs { server: String },
    Log { server: String, file: Option<String> },
    Ports,
    Java { mc_version: Option<String> },
    Stats { server: Option<String> },
    Quit,
}

fn usage(name: &str) -> Option<&'static str> {
    USAGE.iter().find(|(n, _)| *n == name).map(|(_, u)| *u)
}

fn parse_kind(text: &str) -> Result<PluginKind> {
    match text.to_ascii_lowercase().as_str() {
        "plugin" | "plugins" => Ok(PluginKind::Plugin),
        "mod" | "mods" => Ok(PluginKind::Mod),
        other => anyhow::bail!("Unknown type '{}': expected plugin or mod", other),
    }
}

fn player_action(args: &[&str], list: PlayerList) -> Option<PlayerAction> {
    match (list, args) {
        (_, []) => Some(PlayerAction::Show),
        (_, ["remove", player]) => Some(PlayerAction::Remove {
            player: player.to_string(),
        }),
        (PlayerList::Operators, ["add", player, level]) => Some(PlayerAction::Add {
            player: player.to_string(),
            extra: Some(level.to_string()),
        }),
        (PlayerList::Banned, ["add", player, reason @ ..]) if !reason.is_empty() => {
            Some(PlayerAction::Add {
                player: player.to_string(),
                extra: Some(reason.join(" ")),
            })
        }
        (_, ["add", player]) => Some(PlayerAction::Add {
            player: player.to_string(),
            extra: None,
        }),
        _ => None,
    }
}

impl Command {
    pub fn parse(tokens: &[String]) -> Result<Self> {
        let Some((name, rest)) = tokens.split_first() else {
            anyhow::bail!("Empty command");
        };
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();
        fn s(v: &str) -> String {
            v.to_string()
        }

        let command = match (name.as_str(), args.as_slice()) {
            ("help", _) => Command::Help,
            ("list", []) => Command::List,
            ("add", [n, p]) => Command::Add { name: s(n), path: PathBuf::from(p), jar: None },
            ("add", [n, p, j]) => Command::Add {
                name: s(n),
                path: PathBuf::from(p),
                jar: Some(s(j)),
            },
            ("remove", [server]) => Command::Remove { server: s(server) },
            ("delete", [server]) => Command::Delete { server: s(server) },
            ("start", [server]) => Command::Start { server: s(server) },
            ("stop", [server]) => Command::Stop { server: s(server) },
            ("kill", [server]) => Command::Kill { server: s(server) },
            ("restart", [server]) => Command::Restart { server: s(server) },
            ("cmd", [server, line @ ..]) if !line.is_empty() => Command::Cmd {
                server: s(server),
                line: line.join(" "),
            },
            ("eula", [server]) => Command::Eula { server: s(server) },
            ("memory", [server, memory]) => Command::Memory {
                server: s(server),
                memory: s(memory),
            },
            ("versions", []) => Command::Versions,
            ("download", [server]) => Command::Download { server: s(server), version: None },
            ("download", [server, version]) => Command::Download {
                server: s(server),
                version: Some(s(version)),
            },
            ("plugins", [server]) => Command::Plugins { server: s(server) },
            ("search", [source, query @ ..]) => Command::Search {
                source: source.parse()?,
                query: query.join(" "),
            },
            ("install", [server, source, id, filter @ ..]) if filter.len() <= 2 => Command::Install {
                server: s(server),
                source: source.parse()?,
                id: s(id),
                filter: InstallFilter {
                    game_version: filter.first().map(|v| s(v)),
                    loader: filter.get(1).map(|v| s(v)),
                },
            },
            ("add-plugin", [server, file]) => Command::AddPlugin {
                server: s(server),
                file: PathBuf::from(file),
                kind: None,
            },
            ("add-plugin", [server, file, kind]) => Command::AddPlugin {
                server: s(server),
                file: PathBuf::from(file),
                kind: Some(parse_kind(kind)?),
            },
            ("rm-plugin", [server, plugin]) => Command::RmPlugin {
                server: s(server),
                name: s(plugin),
            },
            ("players", [server]) => Command::Players { server: s(server) },
            ("whitelist" | "op" | "ban", [server, rest @ ..]) => {
                let list = match name.as_str() {
                    "whitelist" => PlayerList::Whitelist,
                    "op" => PlayerList::Operators,
                    _ => PlayerList::Banned,
                };
                match player_action(rest, list) {
                    Some(action) => Command::PlayerList {
                        list,
                        server: s(server),
                        action,
                    },
                    None => anyhow::bail!("Usage: {}", usage(name).unwrap_or_default()),
                }
            }
            ("packs", [server]) => Command::Packs { server: s(server) },
            ("pack-download", [server, url]) => Command::PackDownload {
                server: s(server),
                url: s(url),
            },
            ("pack-activate", [server, file]) => Command::PackActivate {
                server: s(server),
                file: s(file),
            },
            ("pack-deactivate", [server]) => Command::PackDeactivate { server: s(server) },
            ("configs", [server]) => Command::Configs { server: s(server) },
            ("config-get", [server, file]) => Command::ConfigGet {
                server: s(server),
                file: s(file),
                key: None,
            },
            ("config-get", [server, file, key]) => Command::ConfigGet {
                server: s(server),
                file: s(file),
                key: Some(s(key)),
            },
            ("config-set", [server, file, key, value @ ..]) if !value.is_empty() => Command::ConfigSet {
                server: s(server),
                file: s(file),
                key: s(key),
                value: value.join(" "),
            },
            ("logs", [server]) => Command::Logs { server: s(server) },
            ("log", [server]) => Command::Log { server: s(server), file: None },
            ("log", [server, file]) => Command::Log {
                server: s(server),
                file: Some(s(file)),
            },
            ("ports", []) => Command::Ports,
            ("java", []) => Command::Java { mc_version: None },
            ("java", [version]) => Command::Java { mc_version: Some(s(version)) },
            ("stats", []) => Command::Stats { server: None },
            ("stats", [server]) => Command::Stats { server: Some(s(server)) },
            ("quit" | "exit", _) => Command::Quit,
            (other, _) => match usage(other) {
                Some(u) => anyhow::bail!("Usage: {}", u),
                None => anyhow::bail!("Unknown command '{}'. Type 'help' for a list.", other),
            },
        };
        Ok(command)
    }
}

pub fn help_text() -> String {
    let mut text = String::from("Commands:\n");
    for (_, u) in USAGE {
        text.push_str("  ");
        text.push_str(u);
        text.push('\n');
    }
    text
}

/// Formats events for the terminal. Download progress is reported in
/// 10% steps per file.
#[derive(Debug, Default)]
pub struct Renderer {
    progress: HashMap<String, u64>,
}

impl Renderer {
    pub fn render(&mut self, event: &AppEvent) -> Option<String> {
        match event {
            AppEvent::Log { message } => {
                let mut message = message.clone();
                if !message.ends_with('\n') {
                    message.push('\n');
                }
                Some(message)
            }
            AppEvent::ServerOutput { server, line, .. } => Some(format!("[{}] {}\n", server, line)),
            AppEvent::EulaRequired { server } => Some(format!(
                "Server '{}' requires the Minecraft EULA (https://aka.ms/MinecraftEULA). \
                 Run 'eula {}' to accept it, then start the server again.\n",
                server, server
            )),
            AppEvent::PlayersChanged { server, online } => Some(format!(
                "Players online on '{}' ({}): {}\n",
                server,
                online.len(),
                online.join(", ")
            )),
            AppEvent::DownloadProgress {
                file,
                downloaded,
                total: Some(total),
            } if *total > 0 => {
                let step = (downloaded.saturating_mul(10) / total).min(10);
                let last = self.progress.insert(file.clone(), step);
                if step == 10 {
                    self.progress.remove(file);
                }
                (last != Some(step)).then(|| {
                    format!(
                        "Downloading {}: {}% ({} / {})\n",
                        file,
                        step * 10,
                        format_bytes(*downloaded),
                        format_bytes(*total)
                    )
                })
            }
            AppEvent::DownloadProgress { .. }
            | AppEvent::ServerStarted { .. }
            | AppEvent::ServerStopped { .. }
            | AppEvent::JobFinished { .. } => None,
        }
    }
}

fn job_name(command: &Command) -> String {
    format!("{:?}", command)
        .split([' ', '{', '('])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Reads commands from stdin and prints events until `quit` or end of input.
/// Each command runs as its own task; failures are reported and the loop goes on.
pub async fn run(state: Arc<AppState>, mut events: mpsc::UnboundedReceiver<AppEvent>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut renderer = Renderer::default();

    println!("Minecraft Server Manager. Type 'help' for commands.");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                let tokens = match tokenize(&line) {
                    Ok(tokens) if tokens.is_empty() => continue,
                    Ok(tokens) => tokens,
                    Err(e) => {
                        println!("Error: {}", e);
                        continue;
                    }
                };
                let command = match Command::parse(&tokens) {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                if command == Command::Quit {
                    break;
                }
                spawn_job(Arc::clone(&state), command);
            }
            Some(event) = events.recv() => {
                if let Some(text) = renderer.render(&event) {
                    print!("{}", text);
                }
            }
        }
    }

    shutdown(&state).await;
    Ok(())
}

fn spawn_job(state: Arc<AppState>, command: Command) {
    let job = job_name(&command);
    tokio::spawn(async move {
        let result = execute(&state, command).await;
        if let Err(e) = &result {
            tracing::warn!("{} failed: {:#}", job, e);
            state.events.log(format!("Error: {:#}\n", e));
        }
        state.events.emit(AppEvent::JobFinished {
            job,
            success: result.is_ok(),
        });
    });
}

/// Asks running servers to stop before the console exits.
async fn shutdown(state: &AppState) {
    for (name, _) in state.servers.running_pids() {
        if let Err(e) = state.servers.stop(&name).await {
            tracing::warn!("Failed to stop '{}' on exit: {:#}", name, e);
        }
    }
}

async fn server_path(state: &AppState, server: &str) -> Result<PathBuf> {
    Ok(state.servers.get(server).await?.path)
}

async fn resolve_config(server_path: &Path, file: &str) -> Result<PathBuf> {
    let files = config_editor::list_config_files(server_path).await?;
    files
        .into_iter()
        .find(|f| {
            f.display_name == file
                || f.path
                    .strip_prefix(server_path)
                    .map(|p| p == Path::new(file))
                    .unwrap_or(false)
        })
        .map(|f| f.path)
        .with_context(|| format!("Configuration file '{}' not found", file))
}

async fn execute(state: &AppState, command: Command) -> Result<()> {
    let out = &state.events;
    match command {
        Command::Help => out.log(help_text()),
        Command::Quit => {}
        Command::List => {
            let servers = state.servers.list().await;
            if servers.is_empty() {
                out.log("No servers registered.\n");
            }
            for s in servers {
                let status = match state.servers.running_pid(&s.path) {
                    Some(pid) => format!("running (PID {})", pid),
                    None => "stopped".to_string(),
                };
                out.log(format!(
                    "{:<20} {:<10} {:<8} {:<28} {}\n",
                    s.name,
                    status,
                    s.memory,
                    s.jar,
                    s.path.display()
                ));
            }
        }
        Command::Add { name, path, jar } => {
            state.servers.add(&name, &path, jar.as_deref()).await?;
        }
        Command::Remove { server } => {
            state.servers.remove(&server).await?;
        }
        Command::Delete { server } => state.servers.delete(&server).await?,
        Command::Start { server } => state.servers.start(&server).await?,
        Command::Stop { server } => state.servers.stop(&server).await?,
        Command::Kill { server } => state.servers.kill(&server).await?,
        Command::Restart { server } => state.servers.restart(&server).await?,
        Command::Cmd { server, line } => state.servers.send_command(&server, &line).await?,
        Command::Eula { server } => state.servers.accept_eula(&server).await?,
        Command::Memory { server, memory } => {
            let record = state.servers.set_memory(&server, &memory).await?;
            out.log(format!("Memory for '{}' set to {}.\n", record.name, record.memory));
        }
        Command::Versions => {
            let versions = state.paper.fetch_versions().await?;
            out.log(format!("Paper versions: {}\n", versions.join(", ")));
        }
        Command::Download { server, version } => {
            let record = state.servers.get(&server).await?;
            let version = match version {
                Some(version) => version,
                None => state
                    .paper
                    .fetch_versions()
                    .await?
                    .into_iter()
                    .next()
                    .context("Paper reported no versions")?,
            };
            let jar = state.paper.download_jar(&version, &record.path).await?;
            state.servers.update_jar(&record.name, &jar).await?;
        }
        Command::Plugins { server } => {
            let path = server_path(state, &server).await?;
            let plugins = state.plugins.local_plugins(&path).await?;
            if plugins.is_empty() {
                out.log("No plugins or mods installed.\n");
            }
            for p in plugins {
                out.log(format!(
                    "{:<28} {:<14} {:<7} {}\n",
                    p.name,
                    p.version,
                    p.kind,
                    p.install_method_display()
                ));
            }
        }
        Command::Search { source, query } => {
            for r in state.plugins.search(source, &query).await? {
                out.log(format!(
                    "{:<10} {:<32} {:<7} {:>10} dl  {}  {}\n",
                    r.id,
                    r.name,
                    r.kind,
                    r.downloads,
                    r.game_version.as_deref().unwrap_or("-"),
                    r.description
                ));
            }
        }
        Command::Install { server, source, id, filter } => {
            let path = server_path(state, &server).await?;
            state.plugins.install(&path, source, &id, &filter).await?;
        }
        Command::AddPlugin { server, file, kind } => {
            let path = server_path(state, &server).await?;
            state.plugins.add_local_plugin(&file, &path, kind).await?;
        }
        Command::RmPlugin { server, name } => {
            let path = server_path(state, &server).await?;
            state.plugins.remove_local_plugin(&path, &name).await?;
        }
        Command::Players { server } => {
            let path = server_path(state, &server).await?;
            if state.servers.is_running(&path) {
                let online = state.servers.online_players(&path);
                out.log(format!("Online ({}): {}\n", online.len(), online.join(", ")));
            } else {
                let last = players::online_from_log(&path).await?;
                out.log(format!(
                    "Stopped. Online at end of latest.log ({}): {}\n",
                    last.len(),
                    last.join(", ")
                ));
            }
            let registry = PlayerRegistry::new(&path);
            for list in [PlayerList::Whitelist, PlayerList::Operators, PlayerList::Banned] {
                let names = registry.names(list).await?;
                out.log(format!("{} ({}): {}\n", list.label(), names.len(), names.join(", ")));
            }
        }
        Command::PlayerList { list, server, action } => {
            let path = server_path(state, &server).await?;
            let registry = PlayerRegistry::new(&path);
            match action {
                PlayerAction::Show => {
                    for entry in registry.entries(list).await? {
                        let detail = match list {
                            PlayerList::Operators => {
                                format!(" (level {})", entry.level.unwrap_or(DEFAULT_OP_LEVEL))
                            }
                            PlayerList::Banned => format!(
                                " ({})",
                                entry.reason.as_deref().unwrap_or(DEFAULT_BAN_REASON)
                            ),
                            PlayerList::Whitelist => String::new(),
                        };
                        out.log(format!("{}{}\n", entry.name, detail));
                    }
                }
                PlayerAction::Add { player, extra } => {
                    let added = match list {
                        PlayerList::Operators => {
                            let level = match extra {
                                Some(level) => level
                                    .parse::<i64>()
                                    .with_context(|| format!("Invalid operator level '{}'", level))?,
                                None => DEFAULT_OP_LEVEL,
                            };
                            registry.add_operator(&player, level).await?
                        }
                        PlayerList::Banned => {
                            registry
                                .ban(&player, extra.as_deref().unwrap_or(DEFAULT_BAN_REASON))
                                .await?
                        }
                        PlayerList::Whitelist => registry.add(list, &player).await?,
                    };
                    if added {
                        out.log(format!("Added {} to {}.\n", player, list.label()));
                    } else {
                        out.log(format!("{} is already in {}.\n", player, list.label()));
                    }
                }
                PlayerAction::Remove { player } => {
                    if registry.remove(list, &player).await? {
                        out.log(format!("Removed {} from {}.\n", player, list.label()));
                    } else {
                        out.log(format!("{} is not in {}.\n", player, list.label()));
                    }
                }
            }
        }
        Command::Packs { server } => {
            let path = server_path(state, &server).await?;
            let active = state.packs.active(&path).await?;
            if active.url.is_empty() {
                out.log("Active pack: none\n");
            } else {
                out.log(format!("Active pack: {} ({})\n", active.url, active.sha1));
            }
            for pack in state.packs.list(&path).await? {
                out.log(format!("{:<40} {}\n", pack.file_name, pack.sha1));
            }
        }
        Command::PackDownload { server, url } => {
            let path = server_path(state, &server).await?;
            let pack = state.packs.download(&path, &url).await?;
            out.log(format!("SHA-1: {}\n", pack.sha1));
        }
        Command::PackActivate { server, file } => {
            state.packs.activate(&state.servers, &server, &file).await?;
        }
        Command::PackDeactivate { server } => state.packs.deactivate(&state.servers, &server).await?,
        Command::Configs { server } => {
            let path = server_path(state, &server).await?;
            let files = config_editor::list_config_files(&path).await?;
            if files.is_empty() {
                out.log("No configuration files found.\n");
            }
            let mut category = String::new();
            for file in files {
                if file.category != category {
                    out.log(format!("{}:\n", file.category));
                    category = file.category.clone();
                }
                out.log(format!("  {}\n", file.display_name));
            }
        }
        Command::ConfigGet { server, file, key } => {
            let path = server_path(state, &server).await?;
            let doc = ConfigDocument::load(&resolve_config(&path, &file).await?).await?;
            match key {
                Some(key) => {
                    let value = doc
                        .get(&key)
                        .with_context(|| format!("Key '{}' not found", key))?;
                    out.log(format!("{} = {}\n", key, config_editor::display_value(value)));
                }
                None => {
                    for entry in doc.entries() {
                        if !entry.help.is_empty() {
                            for line in entry.help.lines() {
                                out.log(format!("# {}\n", line));
                            }
                        }
                        out.log(format!("{} = {}\n", entry.key, entry.display_value()));
                    }
                }
            }
        }
        Command::ConfigSet { server, file, key, value } => {
            let path = server_path(state, &server).await?;
            let mut doc = ConfigDocument::load(&resolve_config(&path, &file).await?).await?;
            doc.set_from_text(&key, &value)?;
            doc.save().await?;
            let shown = doc.get(&key).map(config_editor::display_value).unwrap_or_default();
            out.log(format!("{} = {}\n", key, shown));
        }
        Command::Logs { server } => {
            for file in state.servers.log_files(&server).await? {
                if let Some(name) = file.file_name() {
                    out.log(format!("{}\n", name.to_string_lossy()));
                }
            }
        }
        Command::Log { server, file } => {
            let path = server_path(state, &server).await?;
            let lines = match file {
                Some(file) => {
                    let content = logs::read_log(&logs::logs_dir(&path).join(file)).await?;
                    let all: Vec<String> = content.lines().map(str::to_string).collect();
                    let start = all.len().saturating_sub(LOG_TAIL_LINES);
                    all[start..].to_vec()
                }
                None => logs::tail(&path, LOG_TAIL_LINES).await?,
            };
            out.log(format!("{}\n", lines.join("\n")));
        }
        Command::Ports => {
            let running = state.servers.running_pids();
            if running.is_empty() {
                out.log("No servers are currently running.\n");
                return Ok(());
            }
            let names: HashMap<u32, String> = running.iter().map(|(n, p)| (*p, n.clone())).collect();
            let pids: Vec<u32> = running.iter().map(|(_, p)| *p).collect();
            let entries = ports::analyze(&pids).await?;
            if entries.is_empty() {
                out.log("No listening ports found for running servers.\n");
            }
            for e in entries {
                let server = e.pid.and_then(|p| names.get(&p)).map(String::as_str).unwrap_or("-");
                out.log(format!(
                    "{:<5} {:<8} {:<24} {:<20} {:<8} {}\n",
                    e.proto, e.state, e.local, e.remote, server, e.program
                ));
            }
        }
        Command::Java { mc_version } => {
            out.log(format!("Configured: {}\n", state.java.configured().display()));
            let installations = state.java.installations().await;
            if installations.is_empty() {
                out.log("No Java installations found. Get one from https://adoptium.net\n");
            }
            for java in &installations {
                let major = java.major.map(|m| m.to_string()).unwrap_or_else(|| "?".into());
                out.log(format!("Java {:<3} {}\n", major, java.path.display()));
            }
            if let Some(mc) = mc_version {
                let required = java_version_for_mc(&mc);
                match state.java.find_system_java(required).await {
                    Some(path) => out.log(format!(
                        "Minecraft {} needs Java {}: {}\n",
                        mc,
                        required,
                        path.display()
                    )),
                    None => out.log(format!(
                        "Minecraft {} needs Java {}, which is not installed.\n",
                        mc, required
                    )),
                }
            }
        }
        Command::Stats { server } => {
            let system = state.monitor().get_system_stats();
            out.log(format!(
                "CPU {:.1}%  Memory {} / {} ({:.1}%)\n",
                system.cpu_usage,
                format_bytes(system.memory_used),
                format_bytes(system.memory_total),
                system.memory_percent
            ));

            if let Some(server) = server {
                let record = state.servers.get(&server).await?;
                let pid = state
                    .servers
                    .running_pid(&record.path)
                    .with_context(|| format!("Server '{}' is not running", record.name))?;
                let online = state.servers.online_players(&record.path).len() as u32;
                let max = monitor::max_players(&record.path).await?;
                let stats = state
                    .monitor()
                    .get_server_stats(pid, online, max)
                    .with_context(|| format!("Process {} not found", pid))?;
                out.log(format!(
                    "{} (PID {}): CPU {:.1}%  Memory {}  Players {}/{}\n",
                    record.name,
                    stats.pid,
                    stats.cpu_usage,
                    format_bytes(stats.memory_used),
                    stats.player_count,
                    stats.max_players
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command> {
        Command::parse(&tokenize(line)?)
    }

    #[test]
    fn tokenizer_handles_quotes_and_escapes() {
        assert_eq!(
            tokenize(r#"add "My Server" '/srv/my server' paper.jar"#).unwrap(),
            vec!["add", "My Server", "/srv/my server", "paper.jar"]
        );
        assert_eq!(tokenize(r"cmd lobby say hi\ there").unwrap(), vec!["cmd", "lobby", "say", "hi there"]);
        assert_eq!(tokenize(r#"x """#).unwrap(), vec!["x", ""]);
        assert!(tokenize("say \"oops").is_err());
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn parses_server_commands() {
        assert_eq!(
            parse("add lobby /srv/lobby").unwrap(),
            Command::Add {
                name: "lobby".into(),
                path: PathBuf::from("/srv/lobby"),
                jar: None
            }
        );
        assert_eq!(
            parse("cmd lobby say hello world").unwrap(),
            Command::Cmd {
                server: "lobby".into(),
                line: "say hello world".into()
            }
        );
        assert_eq!(parse("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn parses_plugin_commands() {
        assert_eq!(
            parse("search mr world edit").unwrap(),
            Command::Search {
                source: PluginSource::Modrinth,
                query: "world edit".into()
            }
        );
        assert_eq!(
            parse("install lobby cf 238222 1.21.1 neoforge").unwrap(),
            Command::Install {
                server: "lobby".into(),
                source: PluginSource::CurseForge,
                id: "238222".into(),
                filter: InstallFilter {
                    game_version: Some("1.21.1".into()),
                    loader: Some("neoforge".into()),
                },
            }
        );
        assert!(parse("search nowhere x").is_err());
        assert!(parse("add-plugin lobby a.jar theme").is_err());
    }

    #[test]
    fn parses_player_list_actions() {
        assert_eq!(
            parse("ban lobby add Griefer being rude").unwrap(),
            Command::PlayerList {
                list: PlayerList::Banned,
                server: "lobby".into(),
                action: PlayerAction::Add {
                    player: "Griefer".into(),
                    extra: Some("being rude".into())
                },
            }
        );
        assert_eq!(
            parse("op lobby add Steve 2").unwrap(),
            Command::PlayerList {
                list: PlayerList::Operators,
                server: "lobby".into(),
                action: PlayerAction::Add {
                    player: "Steve".into(),
                    extra: Some("2".into())
                },
            }
        );
        assert!(parse("whitelist lobby add Steve extra").is_err());
    }

    #[test]
    fn usage_errors_name_the_command() {
        let err = parse("start").unwrap_err();
        assert_eq!(err.to_string(), "Usage: start <server>");
        let err = parse("frobnicate").unwrap_err();
        assert!(err.to_string().contains("Unknown command"));
    }

    #[test]
    fn help_lists_every_command() {
        let help = help_text();
        for (name, _) in USAGE {
            assert!(help.contains(name));
        }
    }

    #[test]
    fn renders_progress_in_steps() {
        let mut renderer = Renderer::default();
        let progress = |downloaded| AppEvent::DownloadProgress {
            file: "paper.jar".into(),
            downloaded,
            total: Some(1000),
        };
        assert!(renderer.render(&progress(10)).is_some());
        assert!(renderer.render(&progress(50)).is_none());
        assert!(renderer.render(&progress(120)).unwrap().contains("10%"));
        assert!(renderer.render(&progress(1000)).unwrap().contains("100%"));
        assert!(renderer
            .render(&AppEvent::JobFinished {
                job: "Start".into(),
                success: true
            })
            .is_none());
    }

    #[test]
    fn job_names() {
        assert_eq!(job_name(&Command::Versions), "Versions");
        assert_eq!(job_name(&Command::Start { server: "a".into() }), "Start");
    }
}
