//! Directory scanning shared by the YAML-backed stores.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Every `*.yml` / `*.yaml` file under `dir`, recursively, sorted by path.
///
/// Dotfiles and dot-directories are skipped. An unreadable directory is
/// logged and treated as empty.
pub(crate) fn yaml_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    collect(dir, &mut out)?;
    out.sort();
    Ok(out)
}

fn collect(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "failed to read directory");
            return Ok(());
        }
    };

    for entry in entries {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect(&path, out)?;
            continue;
        }
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "yml" || e == "yaml")
            .unwrap_or(false);
        if is_yaml {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_nested_yaml_and_skips_hidden() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("a/.git")).unwrap();
        fs::write(tmp.path().join("b.yaml"), "").unwrap();
        fs::write(tmp.path().join("a/c.yml"), "").unwrap();
        fs::write(tmp.path().join("a/.git/d.yaml"), "").unwrap();
        fs::write(tmp.path().join("a/e.json"), "").unwrap();

        let files = yaml_files(tmp.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a/c.yml", "b.yaml"]);
    }

    #[test]
    fn missing_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(yaml_files(&tmp.path().join("nope")).unwrap().is_empty());
    }
}
