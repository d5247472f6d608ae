//! Persistable `action_hash -> {activity -> times}` map that steers
//! exploration toward actions that historically led to unvisited
//! activities. Grounded on `ModelReusableAgent.h`'s reuse-model field and
//! the FlatBuffers-equivalent schema this crate's spec settled on in
//! place of pulling in an actual FlatBuffers dependency: a hand-rolled
//! length-framed binary encoding, matching `fastbot-core::binary`'s
//! manual-cursor style.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::PersistenceError;

const MAX_FILE_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReuseModel {
    entries: HashMap<u64, HashMap<String, u32>>,
}

impl ReuseModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, action_hash: u64) -> bool {
        self.entries.contains_key(&action_hash)
    }

    pub fn record(&mut self, action_hash: u64, activity: &str) {
        let targets = self.entries.entry(action_hash).or_default();
        *targets.entry(activity.to_string()).or_insert(0) += 1;
    }

    /// Fraction of this entry's visit-weight whose activity key is not
    /// yet in `visited`. `0.0` when the hash has never been recorded.
    pub fn p_new_activity(&self, action_hash: u64, visited: &HashSet<String>) -> f64 {
        let Some(targets) = self.entries.get(&action_hash) else {
            return 0.0;
        };
        let total: u32 = targets.values().sum();
        if total == 0 {
            return 0.0;
        }
        let new_weight: u32 = targets.iter().filter(|(activity, _)| !visited.contains(*activity)).map(|(_, c)| *c).sum();
        new_weight as f64 / total as f64
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (hash, targets) in &self.entries {
            out.extend_from_slice(&hash.to_le_bytes());
            out.extend_from_slice(&(targets.len() as u32).to_le_bytes());
            for (activity, times) in targets {
                let bytes = activity.as_bytes();
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
                out.extend_from_slice(&times.to_le_bytes());
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PersistenceError> {
        if bytes.is_empty() {
            return Err(PersistenceError::Empty);
        }
        let mut cur = 0usize;
        let entry_count = read_u32(bytes, &mut cur)?;
        let mut entries = HashMap::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let hash = read_u64(bytes, &mut cur)?;
            let target_count = read_u32(bytes, &mut cur)?;
            let mut targets = HashMap::with_capacity(target_count as usize);
            for _ in 0..target_count {
                let len = read_u32(bytes, &mut cur)? as usize;
                let activity_bytes = read_slice(bytes, &mut cur, len)?;
                let activity = String::from_utf8(activity_bytes.to_vec())
                    .map_err(|e| PersistenceError::Malformed(e.to_string()))?;
                let times = read_u32(bytes, &mut cur)?;
                targets.insert(activity, times);
            }
            entries.insert(hash, targets);
        }
        Ok(ReuseModel { entries })
    }

    /// Write to `<path>.tmp`, then atomically rename over `path`. Leaves
    /// the on-disk model untouched if either step fails.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&self.encode())?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Rejects files above 100 MiB or empty files, per the on-disk
    /// contract's explicit size guard.
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let metadata = fs::metadata(path)?;
        if metadata.len() == 0 {
            return Err(PersistenceError::Empty);
        }
        if metadata.len() > MAX_FILE_BYTES {
            return Err(PersistenceError::TooLarge);
        }
        let bytes = fs::read(path)?;
        Self::decode(&bytes)
    }
}

fn read_u32(bytes: &[u8], cur: &mut usize) -> Result<u32, PersistenceError> {
    let slice = read_slice(bytes, cur, 4)?;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_u64(bytes: &[u8], cur: &mut usize) -> Result<u64, PersistenceError> {
    let slice = read_slice(bytes, cur, 8)?;
    Ok(u64::from_le_bytes(slice.try_into().unwrap()))
}

fn read_slice<'a>(bytes: &'a [u8], cur: &mut usize, len: usize) -> Result<&'a [u8], PersistenceError> {
    let end = cur.checked_add(len).ok_or_else(|| PersistenceError::Malformed("length overflow".into()))?;
    if end > bytes.len() {
        return Err(PersistenceError::Malformed("unexpected end of buffer".into()));
    }
    let slice = &bytes[*cur..end];
    *cur = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p_new_activity_is_zero_for_unknown_hash() {
        let model = ReuseModel::new();
        assert_eq!(model.p_new_activity(1, &HashSet::new()), 0.0);
    }

    #[test]
    fn p_new_activity_counts_only_unvisited_activities() {
        let mut model = ReuseModel::new();
        for _ in 0..5 {
            model.record(1, "A");
        }
        for _ in 0..5 {
            model.record(1, "B");
        }
        let mut visited = HashSet::new();
        visited.insert("A".to_string());
        assert!((model.p_new_activity(1, &visited) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn encode_decode_round_trips() {
        let mut model = ReuseModel::new();
        model.record(42, "com.example/.Main");
        model.record(42, "com.example/.Main");
        model.record(7, "com.example/.Other");
        let bytes = model.encode();
        let decoded = ReuseModel::decode(&bytes).unwrap();
        assert_eq!(model, decoded);
    }

    #[test]
    fn decode_rejects_empty_buffer() {
        assert!(matches!(ReuseModel::decode(&[]), Err(PersistenceError::Empty)));
    }

    #[test]
    fn save_and_load_round_trip_through_disk() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let mut model = ReuseModel::new();
        model.record(1, "A");
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("fastbot-reuse-test-{id}.bin"));
        model.save(&path).unwrap();
        let loaded = ReuseModel::load(&path).unwrap();
        assert_eq!(model, loaded);
        let _ = std::fs::remove_file(&path);
    }
}
