//! External tool discovery.

use std::path::{Path, PathBuf};

use rf_core::{Error, Result};

/// Locate an external tool.
///
/// If `override_path` is supplied and exists it is used directly; otherwise
/// the tool is searched on `PATH`. A missing override falls back to `PATH`
/// with a warning rather than failing, so a stale config entry does not
/// break jobs on machines that have the tool installed normally.
pub fn resolve_tool(name: &str, override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = override_path {
        if p.exists() {
            return Ok(p.to_path_buf());
        }
        tracing::warn!(
            "configured path for {name} does not exist ({}); falling back to PATH",
            p.display()
        );
    }

    which::which(name).map_err(|_| Error::ToolNotFound {
        tool: name.to_string(),
    })
}

/// First line of the tool's `-version` output, if it can be executed.
pub fn tool_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout.lines().next().map(|l| l.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_path_wins_when_it_exists() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let resolved = resolve_tool("definitely-not-a-tool", Some(tmp.path())).unwrap();
        assert_eq!(resolved, tmp.path());
    }

    #[test]
    fn missing_tool_reports_name() {
        let err = resolve_tool("nonexistent_tool_xyz_12345", None).unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { tool } if tool == "nonexistent_tool_xyz_12345"));
    }

    #[test]
    fn missing_override_falls_back_to_path() {
        // `sh` is universally available; the bogus override should be ignored.
        let resolved = resolve_tool("sh", Some(Path::new("/no/such/dir/sh")));
        assert!(resolved.is_ok());
    }
}
