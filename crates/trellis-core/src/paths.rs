use dirs::home_dir;
use std::path::PathBuf;

/// Returns the trellis home directory, or None if the user's home cannot be resolved.
pub fn try_trellis_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("TRELLIS_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".trellis"))
}

/// Default repository cache: ~/.trellis/cache
pub fn default_cache_dir() -> Option<PathBuf> {
    try_trellis_home().map(|h| h.join("cache"))
}

/// Default settings file: ~/.trellis/settings.toml
pub fn default_settings_path() -> Option<PathBuf> {
    try_trellis_home().map(|h| h.join("settings.toml"))
}

/// Identity of the local workspace, used to filter `rev@host` revisions.
pub fn local_workspace_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Extract the last segment of a path or URL.
pub fn last_segment(location: &str) -> &str {
    location
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
}
