use std::path::Path;

use anyhow::Context;

use salesmind_core::flows;
use salesmind_core::script::ConversationScript;

/// Parses and validates a JSON conversation script.
pub fn parse_script(json: &str) -> anyhow::Result<ConversationScript> {
    let script: ConversationScript = serde_json::from_str(json).context("decode script JSON")?;
    script
        .validate()
        .with_context(|| format!("invalid script `{}`", script.key))?;
    Ok(script)
}

pub fn load_script_file(path: &Path) -> anyhow::Result<ConversationScript> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read script: {}", path.display()))?;
    parse_script(&raw).with_context(|| format!("load script: {}", path.display()))
}

/// A built-in flow by key.
pub fn builtin_script(key: &str) -> anyhow::Result<ConversationScript> {
    flows::builtin(key).with_context(|| {
        format!(
            "unknown script `{key}` (built-in: {})",
            flows::builtin_keys().join(", ")
        )
    })
}
