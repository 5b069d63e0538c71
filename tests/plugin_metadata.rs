mod common;

use minecraft_server_manager_lib::plugins::metadata::{self, METADATA_FILE};
use minecraft_server_manager_lib::plugins::{InstallMethod, Plugin, PluginKind};
use std::path::PathBuf;

#[tokio::test]
async fn test_add_plugin_metadata_capitalizes_install_method() {
    let (_tmp, _, server_dir) = common::setup_test_env();

    metadata::add_entry(&server_dir, "TestPlugin", "modrinth", Some("123"), PluginKind::Plugin)
        .await
        .unwrap();

    let raw = std::fs::read_to_string(server_dir.join(METADATA_FILE)).unwrap();
    let data: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(data["TestPlugin"]["install_method"], "Modrinth");
    assert_eq!(data["TestPlugin"]["project_id"], "123");
    assert_eq!(data["TestPlugin"]["type"], "plugin");
}

#[tokio::test]
async fn test_remove_entry_keeps_others() {
    let (_tmp, _, server_dir) = common::setup_test_env();

    metadata::add_entry(&server_dir, "A", "spigot", Some("1"), PluginKind::Plugin)
        .await
        .unwrap();
    metadata::add_entry(&server_dir, "B", "curseforge", Some("2"), PluginKind::Mod)
        .await
        .unwrap();

    assert!(metadata::remove_entry(&server_dir, "A").await.unwrap());
    assert!(!metadata::remove_entry(&server_dir, "A").await.unwrap());

    let loaded = metadata::load(&server_dir).await;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded["B"].install_method, InstallMethod::CurseForge);
    assert_eq!(loaded["B"].kind, PluginKind::Mod);
}

#[tokio::test]
async fn test_corrupt_sidecar_reads_as_empty() {
    let (_tmp, _, server_dir) = common::setup_test_env();
    std::fs::write(server_dir.join(METADATA_FILE), "{not json").unwrap();
    assert!(metadata::load(&server_dir).await.is_empty());
}

#[test]
fn test_get_install_method_display() {
    let plugin = Plugin {
        name: "TestPlugin".to_string(),
        file_path: PathBuf::from("plugins/TestPlugin.jar"),
        kind: PluginKind::Plugin,
        version: "1.0".to_string(),
        install_method: InstallMethod::Modrinth,
        project_id: None,
        installed_at: None,
    };
    assert_eq!(plugin.install_method_display(), "🌐 Modrinth");
}
