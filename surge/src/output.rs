use anyhow::Context as _;
use std::path::Path;

pub mod human;
pub mod json;

/// Writes the JSON summary document, creating parent directories as needed.
pub fn write_summary_file(path: &Path, doc: &serde_json::Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create summary dir: {}", parent.display()))?;
    }

    let text = serde_json::to_string_pretty(doc).context("failed to serialize summary")?;
    std::fs::write(path, text)
        .with_context(|| format!("failed to write summary: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_the_summary_with_parent_dirs() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = dir.path().join("out/summary.json");

        let doc = serde_json::json!({ "iterations": 3 });
        write_summary_file(&path, &doc).unwrap_or_else(|e| panic!("{e}"));

        let written = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{e}"));
        assert!(written.contains("\"iterations\": 3"));
    }
}
