use crate::config::AppSettings;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;

const JVM_ROOTS: &[&str] = &["/usr/lib/jvm", "/usr/lib64/jvm"];
const FLATPAK_SPAWN_FALLBACK: &str = "/usr/libexec/flatpak-spawn";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JavaInstallation {
    pub path: PathBuf,
    pub major: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct JavaManager {
    configured: PathBuf,
    jvm_roots: Vec<PathBuf>,
}

impl JavaManager {
    pub fn new(settings: &AppSettings) -> Self {
        Self {
            configured: settings.java_command(),
            jvm_roots: JVM_ROOTS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Scans other JVM directories instead of the system ones.
    pub fn with_roots(settings: &AppSettings, roots: Vec<PathBuf>) -> Self {
        Self {
            configured: settings.java_command(),
            jvm_roots: roots,
        }
    }

    /// The java executable used to launch servers.
    pub fn configured(&self) -> &Path {
        &self.configured
    }

    /// Java executables installed on the system, sorted and de-duplicated.
    /// JVM directories are scanned first, then `update-alternatives`, then `which`.
    pub async fn system_installations(&self) -> Vec<PathBuf> {
        let mut java_paths = scan_jvm_roots(&self.jvm_roots).await;

        if java_paths.is_empty() {
            let output = host_command(&["update-alternatives", "--list", "java"]).await;
            java_paths.extend(
                output
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(PathBuf::from),
            );
        }

        if java_paths.is_empty() {
            let output = host_command(&["which", "java"]).await;
            if !output.is_empty() {
                java_paths.push(PathBuf::from(output));
            }
        }

        java_paths.sort();
        java_paths.dedup();
        java_paths
    }

    /// Installations with their major version.
    pub async fn installations(&self) -> Vec<JavaInstallation> {
        let mut found = Vec::new();
        for path in self.system_installations().await {
            let major = java_version(&path).await;
            found.push(JavaInstallation { path, major });
        }
        found
    }

    /// First installation of the requested major version. `JAVA_HOME` wins
    /// when it points at a matching JDK.
    pub async fn find_system_java(&self, version: u8) -> Option<PathBuf> {
        if let Ok(java_home) = std::env::var("JAVA_HOME") {
            let java_path = PathBuf::from(java_home).join("bin").join("java");
            if java_path.exists() && java_version(&java_path).await == Some(version) {
                return Some(java_path);
            }
        }

        for installation in self.installations().await {
            if installation.major == Some(version) {
                return Some(installation.path);
            }
        }
        None
    }
}

async fn scan_jvm_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut java_paths = Vec::new();
    for root in roots {
        let Ok(mut entries) = fs::read_dir(root).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let java = entry.path().join("bin").join("java");
            if is_executable(&java).await {
                java_paths.push(java);
            }
        }
    }
    java_paths
}

async fn is_executable(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path).await else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Runs a command on the host, escaping the Flatpak sandbox when inside one.
/// Failures yield an empty string.
async fn host_command(command: &[&str]) -> String {
    let mut argv: Vec<String> = command.iter().map(|s| s.to_string()).collect();
    if std::env::var_os("FLATPAK_ID").is_some() {
        let spawn = which_flatpak_spawn().await;
        if let Some(spawn) = spawn {
            argv.splice(0..0, [spawn, "--host".to_string()]);
        }
    }

    let Some((program, args)) = argv.split_first() else {
        return String::new();
    };
    match Command::new(program).args(args).output().await {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        Ok(output) => {
            tracing::debug!("{} exited with {}", program, output.status);
            String::new()
        }
        Err(e) => {
            tracing::debug!("Failed to run {}: {}", program, e);
            String::new()
        }
    }
}

async fn which_flatpak_spawn() -> Option<String> {
    if let Ok(output) = Command::new("which").arg("flatpak-spawn").output().await {
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() && !path.is_empty() {
            return Some(path);
        }
    }
    Path::new(FLATPAK_SPAWN_FALLBACK)
        .exists()
        .then(|| FLATPAK_SPAWN_FALLBACK.to_string())
}

/// Major version from `java -version` output, e.g. `openjdk version "17.0.1"`
/// or `java version "1.8.0_301"`.
pub fn parse_java_version_output(output: &str) -> Option<u8> {
    for line in output.lines() {
        if !line.contains("version") {
            continue;
        }
        let Some(start) = line.find('"') else {
            continue;
        };
        let Some(end) = line[start + 1..].find('"') else {
            continue;
        };
        let ver = &line[start + 1..start + 1 + end];
        let mut parts = ver.split(['.', '_', '-', '+']);
        let first = parts.next()?;
        // Old format: 1.8.0 -> 8
        let major = if first == "1" { parts.next()? } else { first };
        return major.parse().ok();
    }
    None
}

/// Major version of a java executable. The version banner goes to stderr.
pub async fn java_version(java_path: &Path) -> Option<u8> {
    let output = Command::new(java_path).arg("-version").output().await.ok()?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    parse_java_version_output(&stderr)
        .or_else(|| parse_java_version_output(&String::from_utf8_lossy(&output.stdout)))
}

/// Heuristic to determine Java version from Minecraft version
pub fn java_version_for_mc(mc_version: &str) -> u8 {
    let parts: Vec<&str> = mc_version.split('.').collect();
    if parts.len() < 2 {
        return 21;
    }

    let minor = parts[1].parse::<u32>().unwrap_or(0);
    let patch = parts
        .get(2)
        .and_then(|p| p.parse::<u32>().ok())
        .unwrap_or(0);

    match minor {
        // 1.20.5+ -> Java 21
        20 if patch >= 5 => 21,
        m if m > 20 => 21,
        17..=20 => 17,
        _ => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modern_and_legacy_banners() {
        assert_eq!(
            parse_java_version_output(
                "openjdk version \"17.0.9\" 2023-10-17\nOpenJDK Runtime Environment (build 17.0.9+9)"
            ),
            Some(17)
        );
        assert_eq!(
            parse_java_version_output("java version \"1.8.0_301\"\nJava(TM) SE Runtime Environment"),
            Some(8)
        );
        assert_eq!(parse_java_version_output("openjdk version \"21\" 2023-09-19"), Some(21));
        assert_eq!(parse_java_version_output("command not found"), None);
    }

    #[test]
    fn maps_minecraft_to_java() {
        assert_eq!(java_version_for_mc("1.21.4"), 21);
        assert_eq!(java_version_for_mc("1.20.6"), 21);
        assert_eq!(java_version_for_mc("1.20.4"), 17);
        assert_eq!(java_version_for_mc("1.18.2"), 17);
        assert_eq!(java_version_for_mc("1.17"), 17);
        assert_eq!(java_version_for_mc("1.16.5"), 8);
        assert_eq!(java_version_for_mc("snapshot"), 21);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scans_jvm_directories() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        for jdk in ["java-17-openjdk", "java-21-openjdk"] {
            let bin = dir.path().join(jdk).join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            let java = bin.join("java");
            std::fs::write(&java, "#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        // Not executable.
        let broken = dir.path().join("broken-jre").join("bin");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join("java"), "").unwrap();
        std::fs::set_permissions(broken.join("java"), std::fs::Permissions::from_mode(0o644)).unwrap();

        let manager = JavaManager::with_roots(&AppSettings::default(), vec![dir.path().to_path_buf()]);
        let found = manager.system_installations().await;
        assert_eq!(
            found,
            vec![
                dir.path().join("java-17-openjdk/bin/java"),
                dir.path().join("java-21-openjdk/bin/java"),
            ]
        );
    }
}
