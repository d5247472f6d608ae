//! Shared plumbing for the replay binary: a filesystem-backed
//! `ConfigSource` and the directory-of-snapshots convention the binary
//! walks. Kept separate from `main.rs` so it can be exercised by tests
//! without going through `clap`.

use std::fs;
use std::path::{Path, PathBuf};

use fastbot_core::element::ElementTree;
use fastbot_core::{binary, xml};
use fastbot_pref::config::ConfigSource;
use fastbot_pref::error::ConfigError;

/// Reads `<dir>/<key>` verbatim, the obvious on-disk counterpart to the
/// asset-manager reads an Android host would hand in instead.
pub struct DirConfigSource {
    dir: PathBuf,
}

impl DirConfigSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirConfigSource { dir: dir.into() }
    }
}

impl ConfigSource for DirConfigSource {
    fn read_bytes(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        fs::read(self.dir.join(key)).map_err(|e| ConfigError::Unreadable(format!("{key}: {e}")))
    }
}

/// One parsed UI snapshot plus the activity it was captured from, read
/// back from a file named `<ordinal>__<activity>.xml` or `.bin`.
pub struct Snapshot {
    pub path: PathBuf,
    pub activity: String,
    pub tree: ElementTree,
}

/// Lists `dir` for `NNN__activity.{xml,bin}` files, sorted by file name
/// so replay order matches capture order, and parses each into a tree.
/// Files that fail to parse are skipped with a warning rather than
/// aborting the whole replay.
pub fn load_snapshots(dir: &Path) -> anyhow::Result<Vec<Snapshot>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    let mut snapshots = Vec::with_capacity(entries.len());
    for path in entries {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let activity = match stem.split_once("__") {
            Some((_ordinal, activity)) => activity.to_string(),
            None => stem.to_string(),
        };
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let parsed = match extension {
            "xml" => fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|s| xml::parse_xml(&s).map_err(anyhow::Error::from)),
            "bin" => fs::read(&path)
                .map_err(anyhow::Error::from)
                .and_then(|b| binary::parse_binary(&b).map_err(anyhow::Error::from)),
            other => {
                tracing::warn!(path = %path.display(), extension = other, "skipping snapshot with unrecognized extension");
                continue;
            }
        };

        match parsed {
            Ok(mut tree) => {
                tree.normalize(false);
                snapshots.push(Snapshot { path, activity, tree });
            }
            Err(err) => tracing::warn!(path = %path.display(), %err, "skipping unparseable snapshot"),
        }
    }
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastbot_pref::config::MapConfigSource;
    use std::io::Write;

    #[test]
    fn dir_config_source_reads_existing_files_and_rejects_missing_ones() {
        let dir = std::env::temp_dir().join(format!("fastbot-cli-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let mut f = fs::File::create(dir.join("max.strings")).unwrap();
        writeln!(f, "hello").unwrap();

        let source = DirConfigSource::new(&dir);
        assert_eq!(source.read_to_string("max.strings").unwrap().trim(), "hello");
        assert!(source.read_bytes("max.missing").is_err());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn map_config_source_is_a_valid_config_source_too() {
        let source = MapConfigSource::new().with("max.strings", "a\nb\n");
        assert_eq!(source.read_to_string("max.strings").unwrap(), "a\nb\n");
    }

    #[test]
    fn load_snapshots_splits_ordinal_from_activity_and_skips_junk() {
        let dir = std::env::temp_dir().join(format!("fastbot-cli-snap-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("001__com.example.Main.xml"),
            r#"<node class="android.widget.Button" clickable="true" enabled="true" bounds="[0,0][10,10]" text="Go" />"#,
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), "not a snapshot").unwrap();

        let snapshots = load_snapshots(&dir).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].activity, "com.example.Main");

        fs::remove_dir_all(&dir).ok();
    }
}
