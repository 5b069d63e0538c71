use super::models::PluginKind;

const MOD_KEYWORDS: &[&str] = &["forge", "neoforge", "fabric", "quilt"];
const PLUGIN_KEYWORDS: &[&str] = &[
    "bukkit",
    "spigot",
    "paper",
    "purpur",
    "folia",
    "velocity",
    "bungeecord",
    "waterfall",
    "sponge",
];

fn mentions<S: AsRef<str>>(tags: &[S], keywords: &[&str]) -> bool {
    tags.iter().any(|tag| {
        let tag = tag.as_ref().to_lowercase();
        keywords.iter().any(|keyword| tag.contains(keyword))
    })
}

/// Best-effort plugin/mod label from loader or category tags.
///
/// Tags naming only mod loaders give `Mod`, tags naming only server platforms
/// give `Plugin`. Mixed or silent tags defer to the registry's project type,
/// and a project with neither is treated as a plugin.
pub fn classify<S: AsRef<str>>(tags: &[S], project_type: Option<&str>) -> PluginKind {
    let modded = mentions(tags, MOD_KEYWORDS);
    let plugin = mentions(tags, PLUGIN_KEYWORDS);

    match (modded, plugin) {
        (true, false) => PluginKind::Mod,
        (false, true) => PluginKind::Plugin,
        _ => match project_type.map(|t| t.trim().to_ascii_lowercase()) {
            Some(t) if t == "mod" => PluginKind::Mod,
            _ => PluginKind::Plugin,
        },
    }
}
