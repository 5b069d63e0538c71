use super::models::PluginKind;
use anyhow::Result;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

pub const UNKNOWN_VERSION: &str = "Unknown";

const PLUGIN_DESCRIPTORS: &[&str] = &["plugin.yml", "paper-plugin.yml", "bungee.yml"];
const FABRIC_DESCRIPTORS: &[&str] = &["fabric.mod.json", "quilt.mod.json"];
const FORGE_DESCRIPTORS: &[&str] = &["META-INF/mods.toml", "META-INF/neoforge.mods.toml"];
const MANIFEST: &str = "META-INF/MANIFEST.MF";

type Jar = ZipArchive<File>;

fn read_entry(archive: &mut Jar, name: &str) -> Result<Option<String>> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn yaml_version(text: &str) -> Option<String> {
    let doc: serde_yaml::Value = serde_yaml::from_str(text).ok()?;
    doc.get("version").and_then(scalar_to_string)
}

fn json_version(text: &str) -> Option<String> {
    let doc: serde_json::Value = serde_json::from_str(text).ok()?;
    doc["version"]
        .as_str()
        .or_else(|| doc["quilt_loader"]["version"].as_str())
        .map(str::to_string)
}

fn toml_version(text: &str) -> Option<String> {
    let doc: toml::Value = toml::from_str(text).ok()?;
    doc.get("mods")
        .and_then(|mods| mods.as_array())
        .and_then(|mods| mods.iter().find_map(|m| m.get("version")))
        .or_else(|| doc.get("version"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn manifest_value(manifest: &str, key: &str) -> Option<String> {
    manifest.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim() == key).then(|| v.trim().to_string())
    })
}

/// Substitutes build placeholders such as `${file.jarVersion}` with the
/// manifest's `Implementation-Version`.
fn resolve_placeholder(archive: &mut Jar, version: String) -> Result<Option<String>> {
    if !version.contains("${") {
        return Ok(Some(version));
    }
    Ok(read_entry(archive, MANIFEST)?
        .and_then(|manifest| manifest_value(&manifest, "Implementation-Version")))
}

fn find_version(jar_path: &Path) -> Result<Option<String>> {
    let mut archive = ZipArchive::new(File::open(jar_path)?)?;

    let lookups: [(&[&str], fn(&str) -> Option<String>); 3] = [
        (PLUGIN_DESCRIPTORS, yaml_version),
        (FABRIC_DESCRIPTORS, json_version),
        (FORGE_DESCRIPTORS, toml_version),
    ];

    for (descriptors, parse) in lookups {
        for name in descriptors {
            let Some(text) = read_entry(&mut archive, name)? else {
                continue;
            };
            if let Some(version) = parse(&text) {
                if let Some(resolved) = resolve_placeholder(&mut archive, version)? {
                    return Ok(Some(resolved));
                }
            }
        }
    }
    Ok(None)
}

/// Version declared by a plugin or mod JAR, or `"Unknown"`.
pub fn extract_version(jar_path: &Path) -> String {
    match find_version(jar_path) {
        Ok(Some(version)) if !version.trim().is_empty() => version.trim().to_string(),
        Ok(_) => UNKNOWN_VERSION.to_string(),
        Err(e) => {
            tracing::debug!("Could not read version from {}: {}", jar_path.display(), e);
            UNKNOWN_VERSION.to_string()
        }
    }
}

/// Mod when the JAR carries a Fabric/Quilt/Forge descriptor, plugin when it
/// carries a Bukkit/Bungee one. `None` for anything else.
pub fn detect_kind(jar_path: &Path) -> Option<PluginKind> {
    let mut archive = ZipArchive::new(File::open(jar_path).ok()?).ok()?;
    let has = |archive: &mut Jar, names: &[&str]| {
        names.iter().any(|name| archive.by_name(name).is_ok())
    };

    if has(&mut archive, FABRIC_DESCRIPTORS) || has(&mut archive, FORGE_DESCRIPTORS) {
        Some(PluginKind::Mod)
    } else if has(&mut archive, PLUGIN_DESCRIPTORS) {
        Some(PluginKind::Plugin)
    } else {
        None
    }
}
