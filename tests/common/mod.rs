#![allow(dead_code)]

use minecraft_server_manager_lib::config::AppSettings;
use minecraft_server_manager_lib::events::EventSink;
use minecraft_server_manager_lib::server_manager::ServerManager;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// A temp root holding a `servers.json` location and one server directory.
pub fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let config_path = tmp.path().join("config").join("servers.json");
    let server_dir = tmp.path().join("survival");
    fs::create_dir_all(&server_dir).unwrap();
    (tmp, config_path, server_dir)
}

pub fn test_manager(config_path: &Path) -> ServerManager {
    ServerManager::new(config_path.to_path_buf(), AppSettings::default(), EventSink::silent())
}

/// Writes a zip archive with the given (name, content) entries.
pub fn create_test_jar(path: &Path, entries: &[(&str, &str)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let file = fs::File::create(path).unwrap();
    let mut jar = zip::ZipWriter::new(file);
    for (name, content) in entries {
        jar.start_file(*name, SimpleFileOptions::default()).unwrap();
        jar.write_all(content.as_bytes()).unwrap();
    }
    jar.finish().unwrap();
}
