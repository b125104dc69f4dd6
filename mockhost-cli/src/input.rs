//! Script and binding files

use anyhow::{Context, Result};
use mockhost_scripting::{ScriptBindings, ScriptSource};
use std::path::Path;

/// Read a script file; its file name becomes the script id
pub fn load_script(path: &Path) -> Result<ScriptSource> {
    let code = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script file {}", path.display()))?;
    let id = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("script")
        .to_string();

    Ok(ScriptSource::new(id, code))
}

/// Read bindings from a JSON object file, or start empty
pub fn load_bindings(path: Option<&Path>) -> Result<ScriptBindings> {
    let Some(path) = path else {
        return Ok(ScriptBindings::new());
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read bindings file {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Bindings file {} is not valid JSON", path.display()))?;

    ScriptBindings::from_json(json)
        .map_err(|e| anyhow::anyhow!("Invalid bindings in {}: {}", path.display(), e))
}
