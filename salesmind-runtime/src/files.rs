use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(path).with_context(|| format!("failed to create dir: {}", path.display()))
}

/// Moves `tmp` over `dst`, keeping the previous `dst` as a backup until the rename lands.
///
/// `rename` fails on Windows when the destination exists, so the old file is moved aside first.
pub fn replace_file(tmp: &Path, dst: &Path) -> anyhow::Result<()> {
    let backup = dst.with_extension("bak");

    if dst.exists() {
        let _ = fs::remove_file(&backup);
        fs::rename(dst, &backup)
            .with_context(|| format!("failed rename {} -> {}", dst.display(), backup.display()))?;
    }

    if let Err(e) = fs::rename(tmp, dst) {
        if backup.exists() {
            let _ = fs::rename(&backup, dst);
        }
        let _ = fs::remove_file(tmp);
        return Err(anyhow::Error::new(e).context(format!(
            "failed rename {} -> {}",
            tmp.display(),
            dst.display()
        )));
    }

    let _ = fs::remove_file(&backup);
    Ok(())
}

/// Writes `value` as pretty JSON next to `path`, then swaps it into place.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let json = serde_json::to_vec_pretty(value).context("encode JSON")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("failed to write temp: {}", tmp.display()))?;
    replace_file(&tmp, path)
}

/// `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(anyhow::Error::new(e).context(format!("failed to read: {}", path.display())));
        }
    };
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("failed to parse JSON: {}", path.display()))?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_overwrites_and_cleans_backup() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("calls.json");
        fs::write(&dst, "old").unwrap();

        let tmp = dir.path().join("calls.json.tmp");
        fs::write(&tmp, "new").unwrap();
        replace_file(&tmp, &dst).unwrap();

        assert_eq!(fs::read_to_string(&dst).unwrap(), "new");
        assert!(!tmp.exists());
        assert!(!dst.with_extension("bak").exists());
    }

    #[test]
    fn failed_replace_restores_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("calls.json");
        fs::write(&dst, "old").unwrap();

        let missing_tmp = dir.path().join("never-written.tmp");
        assert!(replace_file(&missing_tmp, &dst).is_err());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "old");
    }

    #[test]
    fn missing_json_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let got: Option<Vec<String>> = read_json(&dir.path().join("nope.json")).unwrap();
        assert!(got.is_none());

        let path = dir.path().join("nested/list.json");
        write_json_atomic(&path, &vec!["a".to_string()]).unwrap();
        let got: Option<Vec<String>> = read_json(&path).unwrap();
        assert_eq!(got.unwrap(), ["a"]);
    }
}
