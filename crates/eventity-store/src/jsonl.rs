// ABOUTME: JSONL file storage provider, one append-only event file per entity stream.
// ABOUTME: Appends are fsynced; torn trailing lines are repaired by atomic truncation.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use eventity_core::EventEnvelope;

use crate::paths::{fs_name, sync_parent};
use crate::provider::{StorageError, StorageProvider, check_append};

/// A file-backed provider: each stream is one append-only JSONL file under
/// `root/<entity_type>/<entity_id>.jsonl`, one serialized envelope per line.
/// The tag index for an entity type lives next to its streams in
/// `tags.json`, rewritten atomically whenever a tagged stream is created.
///
/// Appends through one provider instance are serialized by an internal
/// lock; appends from other instances sharing the directory are caught by
/// the sequence re-check against the file.
pub struct JsonlStorageProvider {
    root: PathBuf,
    lock: Mutex<()>,
}

impl JsonlStorageProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the root directory holding all stream files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stream_path(&self, entity_type: &str, entity_id: &str) -> PathBuf {
        self.root
            .join(fs_name(entity_type))
            .join(format!("{}.jsonl", fs_name(entity_id)))
    }

    fn tags_path(&self, entity_type: &str) -> PathBuf {
        self.root.join(fs_name(entity_type)).join("tags.json")
    }

    /// Read a stream file, keeping the valid prefix. Returns the envelopes
    /// and whether the file ended in a torn (unparseable) trailing line.
    /// Corruption anywhere else is an error, never skipped: dropping an
    /// interior line would break the gap-free sequence invariant.
    fn read_stream(path: &Path) -> Result<(Vec<EventEnvelope>, bool), StorageError> {
        if !path.exists() {
            return Ok((Vec::new(), false));
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;

        let mut envelopes = Vec::new();
        let mut torn = false;
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventEnvelope>(line) {
                Ok(envelope) => envelopes.push(envelope),
                Err(source) if index + 1 == lines.len() => {
                    // A torn final line is the artifact of an interrupted
                    // append; everything before it is intact.
                    tracing::warn!(
                        "torn trailing line in {}: {}",
                        path.display(),
                        source
                    );
                    torn = true;
                }
                Err(source) => return Err(StorageError::Codec(source)),
            }
        }

        Ok((envelopes, torn))
    }

    /// Rewrite a stream file to exactly `envelopes` via temp file, fsync,
    /// and atomic rename.
    fn rewrite_stream(path: &Path, envelopes: &[EventEnvelope]) -> Result<(), StorageError> {
        let tmp_path = path.with_extension("jsonl.tmp");

        let mut tmp_file = File::create(&tmp_path)?;
        for envelope in envelopes {
            let json = serde_json::to_string(envelope)?;
            writeln!(tmp_file, "{json}")?;
        }
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, path)?;
        sync_parent(path);
        Ok(())
    }

    fn load_tags(path: &Path) -> Result<BTreeMap<String, BTreeSet<String>>, StorageError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn store_tags(
        path: &Path,
        index: &BTreeMap<String, BTreeSet<String>>,
    ) -> Result<(), StorageError> {
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(index)?;

        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, path)?;
        sync_parent(path);
        Ok(())
    }
}

impl StorageProvider for JsonlStorageProvider {
    fn initialize(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        tracing::info!("jsonl store ready at {}", self.root.display());
        Ok(())
    }

    fn last_sequence(&self, entity_type: &str, entity_id: &str) -> Result<u64, StorageError> {
        let (envelopes, _) = Self::read_stream(&self.stream_path(entity_type, entity_id))?;
        Ok(envelopes.last().map(|envelope| envelope.sequence).unwrap_or(0))
    }

    fn append(
        &self,
        entity_type: &str,
        entity_id: &str,
        envelopes: &[EventEnvelope],
    ) -> Result<(), StorageError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StorageError::Unavailable("provider lock poisoned".to_string()))?;

        let path = self.stream_path(entity_type, entity_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let (existing, torn) = Self::read_stream(&path)?;
        if torn {
            Self::rewrite_stream(&path, &existing)?;
            tracing::warn!(
                "repaired {} to {} event(s)",
                path.display(),
                existing.len()
            );
        }

        let last = existing.last().map(|envelope| envelope.sequence).unwrap_or(0);
        check_append(entity_type, entity_id, last, envelopes)?;

        // One buffered write for the whole batch, then fsync. A crash can
        // tear at most the final line, which the next append truncates.
        let mut buffer = String::new();
        for envelope in envelopes {
            buffer.push_str(&serde_json::to_string(envelope)?);
            buffer.push('\n');
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(buffer.as_bytes())?;
        file.sync_all()?;

        if let Some(first) = envelopes.first()
            && first.sequence == 1
            && !first.tags.is_empty()
        {
            let tags_path = self.tags_path(entity_type);
            let mut index = Self::load_tags(&tags_path)?;
            for tag in &first.tags {
                index
                    .entry(tag.clone())
                    .or_default()
                    .insert(entity_id.to_string());
            }
            Self::store_tags(&tags_path, &index)?;
        }

        Ok(())
    }

    fn read(&self, entity_type: &str, entity_id: &str) -> Result<Vec<EventEnvelope>, StorageError> {
        let (envelopes, _) = Self::read_stream(&self.stream_path(entity_type, entity_id))?;
        Ok(envelopes)
    }

    fn entity_ids_by_tag(
        &self,
        entity_type: &str,
        tag: &str,
    ) -> Result<BTreeSet<String>, StorageError> {
        let index = Self::load_tags(&self.tags_path(entity_type))?;
        Ok(index.get(tag).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;
    use ulid::Ulid;

    fn make_envelope(entity_id: &str, sequence: u64, tags: Vec<String>) -> EventEnvelope {
        EventEnvelope {
            entity_type: "todo-list".to_string(),
            entity_id: entity_id.to_string(),
            sequence,
            event_type: "todo-added".to_string(),
            payload: serde_json::json!({"todo": format!("item {sequence}")}),
            tags,
            recorded_at: Utc::now(),
            commit_id: Ulid::new(),
        }
    }

    #[test]
    fn append_and_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let provider = JsonlStorageProvider::new(dir.path().join("store"));
        provider.initialize().unwrap();

        provider
            .append(
                "todo-list",
                "list-1",
                &[
                    make_envelope("list-1", 1, Vec::new()),
                    make_envelope("list-1", 2, Vec::new()),
                ],
            )
            .unwrap();

        let stream = provider.read("todo-list", "list-1").unwrap();
        assert_eq!(stream.len(), 2);
        assert_eq!(stream[0].sequence, 1);
        assert_eq!(stream[1].sequence, 2);
        assert_eq!(provider.last_sequence("todo-list", "list-1").unwrap(), 2);
    }

    #[test]
    fn initialize_twice_preserves_committed_events() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");

        let provider = JsonlStorageProvider::new(&root);
        provider.initialize().unwrap();
        provider
            .append(
                "todo-list",
                "list-1",
                &[make_envelope("list-1", 1, Vec::new())],
            )
            .unwrap();

        provider.initialize().unwrap();
        assert_eq!(provider.read("todo-list", "list-1").unwrap().len(), 1);

        // A fresh provider over the same directory sees the same data.
        let reopened = JsonlStorageProvider::new(&root);
        reopened.initialize().unwrap();
        assert_eq!(reopened.read("todo-list", "list-1").unwrap().len(), 1);
    }

    #[test]
    fn stale_append_conflicts_without_writing() {
        let dir = TempDir::new().unwrap();
        let provider = JsonlStorageProvider::new(dir.path().join("store"));
        provider.initialize().unwrap();

        provider
            .append(
                "todo-list",
                "list-1",
                &[make_envelope("list-1", 1, Vec::new())],
            )
            .unwrap();

        let err = provider
            .append(
                "todo-list",
                "list-1",
                &[make_envelope("list-1", 1, Vec::new())],
            )
            .unwrap_err();

        assert!(err.is_concurrency_conflict());
        assert_eq!(provider.read("todo-list", "list-1").unwrap().len(), 1);
    }

    #[test]
    fn torn_trailing_line_is_tolerated_and_repaired() {
        let dir = TempDir::new().unwrap();
        let provider = JsonlStorageProvider::new(dir.path().join("store"));
        provider.initialize().unwrap();

        provider
            .append(
                "todo-list",
                "list-1",
                &[
                    make_envelope("list-1", 1, Vec::new()),
                    make_envelope("list-1", 2, Vec::new()),
                ],
            )
            .unwrap();

        // Simulate a crash mid-append: a partial line at the end of the file.
        let path = provider.stream_path("todo-list", "list-1");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, r#"{{"entity_type":"todo-list","sequence":3,"tr"#).unwrap();
        drop(file);

        // Reads see the valid prefix.
        let stream = provider.read("todo-list", "list-1").unwrap();
        assert_eq!(stream.len(), 2);
        assert_eq!(provider.last_sequence("todo-list", "list-1").unwrap(), 2);

        // The next append repairs the tear and continues at sequence 3.
        provider
            .append(
                "todo-list",
                "list-1",
                &[make_envelope("list-1", 3, Vec::new())],
            )
            .unwrap();

        let stream = provider.read("todo-list", "list-1").unwrap();
        assert_eq!(stream.len(), 3);
        assert_eq!(stream[2].sequence, 3);
    }

    #[test]
    fn interior_corruption_is_an_error_not_a_skip() {
        let dir = TempDir::new().unwrap();
        let provider = JsonlStorageProvider::new(dir.path().join("store"));
        provider.initialize().unwrap();

        provider
            .append(
                "todo-list",
                "list-1",
                &[make_envelope("list-1", 1, Vec::new())],
            )
            .unwrap();

        let path = provider.stream_path("todo-list", "list-1");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json at all").unwrap();
        writeln!(
            file,
            "{}",
            serde_json::to_string(&make_envelope("list-1", 2, Vec::new())).unwrap()
        )
        .unwrap();
        drop(file);

        let err = provider.read("todo-list", "list-1").unwrap_err();
        assert!(matches!(err, StorageError::Codec(_)));
    }

    #[test]
    fn tag_index_survives_reopening() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("store");

        let provider = JsonlStorageProvider::new(&root);
        provider.initialize().unwrap();
        provider
            .append(
                "todo-list",
                "Groceries",
                &[make_envelope("Groceries", 1, vec!["Private".to_string()])],
            )
            .unwrap();

        let reopened = JsonlStorageProvider::new(&root);
        let ids = reopened.entity_ids_by_tag("todo-list", "Private").unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("Groceries"));
        assert!(
            reopened
                .entity_ids_by_tag("todo-list", "Public")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn awkward_identifiers_map_to_safe_paths() {
        let dir = TempDir::new().unwrap();
        let provider = JsonlStorageProvider::new(dir.path().join("store"));
        provider.initialize().unwrap();

        let entity_id = "weird/id with:spaces";
        let envelope = make_envelope(entity_id, 1, Vec::new());

        provider.append("todo-list", entity_id, &[envelope]).unwrap();

        let stream = provider.read("todo-list", entity_id).unwrap();
        assert_eq!(stream.len(), 1);
        assert_eq!(stream[0].entity_id, entity_id);
    }
}
