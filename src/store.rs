use crate::error::SubdictError;
use crate::row::{Row, Timestamp};

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// On-disk shape of a dictionary. Map keys are written as strings by serde_json.
#[derive(Debug, Serialize, Deserialize)]
struct StoredDictionary {
    plate: String,
    rows: BTreeMap<u32, StoredRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRow {
    number: String,
    timestamp: String,
    #[serde(default)]
    en: String,
    #[serde(default)]
    zh: String,
}

impl From<&Row> for StoredRow {
    fn from(row: &Row) -> Self {
        StoredRow {
            number: row.number.to_string(),
            timestamp: row.timestamp.to_string(),
            en: row.en.clone(),
            zh: row.zh.clone(),
        }
    }
}

impl StoredRow {
    fn into_row(self, key: u32) -> Result<Row, SubdictError> {
        check_index(key)?;
        if self.number.trim().parse::<u32>().ok() != Some(key) {
            return Err(SubdictError::RowNumberMismatch {
                key,
                number: self.number,
            });
        }
        let timestamp: Timestamp = self.timestamp.parse()?;
        Ok(Row {
            number: key,
            timestamp,
            en: self.en,
            zh: self.zh,
        })
    }
}

/// Largest index a row may take; `next_index` never has to go past it.
const MAX_INDEX: u32 = u32::MAX - 1;

#[derive(Debug, Default)]
struct State {
    plate: Option<String>,
    rows: BTreeMap<u32, Row>,
    set_aside: Option<PathBuf>,
}

/// Rows of the active plate, keyed by index. Every access goes through one lock.
#[derive(Debug)]
pub struct RowStore {
    data_dir: PathBuf,
    state: Mutex<State>,
}

impl RowStore {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        RowStore {
            data_dir: data_dir.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Starts a session for `plate`. Returns `true` when an existing dictionary was loaded.
    /// An unreadable or corrupt dictionary is treated as absent and renamed
    /// out of the way, see [`RowStore::set_aside`].
    pub fn initialize(&self, plate: &str) -> Result<bool> {
        fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("Failed to create data directory: '{}'", self.data_dir.display())
        })?;
        let path = self.path_for(plate);

        let mut set_aside = None;
        let rows = match load(&path) {
            Ok(rows) => rows,
            Err(err) => {
                let backup = move_aside(&path)?;
                warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    error = %format!("{:#}", err),
                    "Ignoring unreadable dictionary"
                );
                set_aside = Some(backup);
                None
            }
        };
        let found = rows.is_some();

        let mut state = self.state.lock();
        state.plate = Some(plate.to_string());
        state.rows = rows.unwrap_or_default();
        state.set_aside = set_aside;
        info!(plate, path = %path.display(), found, rows = state.rows.len(), "Session initialised");
        Ok(found)
    }

    pub fn next_index(&self) -> u32 {
        next_index(&self.state.lock().rows)
    }

    /// Stores `row` under `index`, which must be its own number.
    pub fn set_row(&self, index: u32, row: Row) -> Result<(), SubdictError> {
        check_index(index)?;
        if row.number != index {
            return Err(SubdictError::RowNumberMismatch {
                key: index,
                number: row.number.to_string(),
            });
        }
        self.state.lock().rows.insert(index, row);
        Ok(())
    }

    /// Allocates the next index and stores a fresh row under it in one step.
    pub fn append(&self, timestamp: Timestamp, en: &str) -> Result<Row, SubdictError> {
        let mut state = self.state.lock();
        let index = next_index(&state.rows);
        if index > MAX_INDEX {
            return Err(SubdictError::IndexExhausted);
        }
        let row = Row::new(index, timestamp, en);
        state.rows.insert(index, row.clone());
        Ok(row)
    }

    pub fn get_row(&self, index: u32) -> Option<Row> {
        self.state.lock().rows.get(&index).cloned()
    }

    /// A snapshot of every row, ordered by index.
    pub fn get_data(&self) -> BTreeMap<u32, Row> {
        self.state.lock().rows.clone()
    }

    pub fn last_row(&self) -> Option<Row> {
        self.state.lock().rows.values().next_back().cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().rows.len()
    }

    pub fn plate(&self) -> Option<String> {
        self.state.lock().plate.clone()
    }

    /// Where an unreadable dictionary was moved when this session started.
    pub fn set_aside(&self) -> Option<PathBuf> {
        self.state.lock().set_aside.clone()
    }

    /// Writes the active dictionary to disk and returns its path, or `None`
    /// when no session has been started.
    pub fn save(&self) -> Result<Option<PathBuf>> {
        let state = self.state.lock();
        let plate = match &state.plate {
            Some(plate) => plate.clone(),
            None => return Ok(None),
        };
        let doc = StoredDictionary {
            plate: plate.clone(),
            rows: state
                .rows
                .iter()
                .map(|(index, row)| (*index, StoredRow::from(row)))
                .collect(),
        };

        fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("Failed to create data directory: '{}'", self.data_dir.display())
        })?;
        let path = self.path_for(&plate);
        let tmp_path = path.with_extension("json.tmp");
        write_document(&tmp_path, &doc)
            .with_context(|| format!("Failed to write dictionary: '{}'", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to replace dictionary: '{}'", path.display()))?;

        info!(plate = %plate, path = %path.display(), rows = doc.rows.len(), "Dictionary saved");
        Ok(Some(path))
    }

    fn path_for(&self, plate: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", sanitise_plate(plate)))
    }
}

/// Makes a plate name safe to use as a file name stem.
pub fn sanitise_plate(plate: &str) -> String {
    plate.replace(['/', '\\'], "_")
}

fn check_index(index: u32) -> Result<(), SubdictError> {
    if index == 0 || index > MAX_INDEX {
        return Err(SubdictError::RowNumberOutOfRange(index));
    }
    Ok(())
}

// Keys never exceed MAX_INDEX, so this saturates only past the last usable index.
fn next_index(rows: &BTreeMap<u32, Row>) -> u32 {
    rows.keys()
        .next_back()
        .map_or(1, |max| max.saturating_add(1))
}

/// Renames an unreadable dictionary to the first free `<name>.corrupt[.n]`
/// so the next save cannot overwrite it.
fn move_aside(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let backup = (0..)
        .map(|n| match n {
            0 => path.with_file_name(format!("{}.corrupt", name)),
            n => path.with_file_name(format!("{}.corrupt.{}", name, n)),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.with_file_name(format!("{}.corrupt", name)));
    fs::rename(path, &backup).with_context(|| {
        format!(
            "Failed to move unreadable dictionary '{}' to '{}'",
            path.display(),
            backup.display()
        )
    })?;
    Ok(backup)
}

fn load(path: &Path) -> Result<Option<BTreeMap<u32, Row>>> {
    if !path.exists() {
        debug!(path = %path.display(), "No dictionary on disk");
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dictionary: '{}'", path.display()))?;
    let doc: StoredDictionary = serde_json::from_str(&data)
        .map_err(|err| SubdictError::CorruptDictionary(err.to_string()))?;

    let rows = doc
        .rows
        .into_iter()
        .map(|(key, stored)| stored.into_row(key).map(|row| (key, row)))
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(Some(rows))
}

fn write_document(path: &Path, doc: &StoredDictionary) -> Result<()> {
    let file = fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, doc)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(number: u32, millis: u64, en: &str, zh: &str) -> Row {
        Row::new(number, Timestamp::from_millis(millis), en).with_zh(zh)
    }

    #[test]
    fn next_index_starts_at_one() {
        let dir = TempDir::new().unwrap();
        let store = RowStore::new(dir.path());
        assert!(!store.initialize("demo").unwrap());
        assert_eq!(store.next_index(), 1);
    }

    #[test]
    fn next_index_follows_the_largest_key() {
        let dir = TempDir::new().unwrap();
        let store = RowStore::new(dir.path());
        store.initialize("demo").unwrap();

        store.set_row(7, row(7, 0, "seven", "")).unwrap();
        store.set_row(2, row(2, 0, "two", "")).unwrap();
        assert_eq!(store.next_index(), 8);

        let appended = store.append(Timestamp::from_millis(10), "eight").unwrap();
        assert_eq!(appended.number, 8);
        assert_eq!(store.next_index(), 9);
    }

    #[test]
    fn save_then_initialize_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = RowStore::new(dir.path());
        store.initialize("show/s01\\e01").unwrap();
        store.set_row(1, row(1, 1000, "hello", "你好")).unwrap();
        store.set_row(2, row(2, 582_350, "one of the things", "")).unwrap();
        store.set_row(10, row(10, 3_600_000, "", "只有中文")).unwrap();

        let path = store.save().unwrap().unwrap();
        assert_eq!(path, dir.path().join("show_s01_e01.json"));

        let reloaded = RowStore::new(dir.path());
        assert!(reloaded.initialize("show/s01\\e01").unwrap());
        assert_eq!(reloaded.get_data(), store.get_data());
        assert_eq!(reloaded.next_index(), 11);
    }

    #[test]
    fn persisted_keys_are_textual_and_ordered() {
        let dir = TempDir::new().unwrap();
        let store = RowStore::new(dir.path());
        store.initialize("demo").unwrap();
        store.set_row(10, row(10, 0, "ten", "")).unwrap();
        store.set_row(9, row(9, 0, "nine", "")).unwrap();
        let path = store.save().unwrap().unwrap();

        let text = fs::read_to_string(path).unwrap();
        let nine = text.find("\"9\"").unwrap();
        let ten = text.find("\"10\"").unwrap();
        assert!(nine < ten);
        assert!(text.contains("\"plate\": \"demo\""));
        assert!(text.contains("\"timestamp\": \"[00:00:00.000]\""));
    }

    #[test]
    fn corrupt_dictionary_falls_back_to_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("demo.json"), "{ not json").unwrap();

        let store = RowStore::new(dir.path());
        assert!(!store.initialize("demo").unwrap());
        assert_eq!(store.len(), 0);
        assert_eq!(store.plate().as_deref(), Some("demo"));
        assert_eq!(store.set_aside(), Some(dir.path().join("demo.json.corrupt")));
    }

    #[test]
    fn corrupt_dictionary_survives_the_next_save() {
        let dir = TempDir::new().unwrap();
        let original = r#"{"plate":"c","rows":{"1":{"number":"1","timestamp":"[00:00:01.000]","en":"kept","zh":""},"2":{"number":"2","timestamp":"[00:99:01.000]","en":"bad","zh":""}}}"#;
        fs::write(dir.path().join("c.json"), original).unwrap();
        fs::write(dir.path().join("c.json.corrupt"), "older backup").unwrap();

        let store = RowStore::new(dir.path());
        assert!(!store.initialize("c").unwrap());
        store.save().unwrap();

        let backup = dir.path().join("c.json.corrupt.1");
        assert_eq!(store.set_aside(), Some(backup.clone()));
        assert_eq!(fs::read_to_string(backup).unwrap(), original);
        assert_eq!(
            fs::read_to_string(dir.path().join("c.json.corrupt")).unwrap(),
            "older backup"
        );
        assert!(store.initialize("c").unwrap());
        assert_eq!(store.set_aside(), None);
    }

    #[test]
    fn out_of_range_keys_make_the_dictionary_corrupt() {
        let dir = TempDir::new().unwrap();
        let top = r#"{"plate":"top","rows":{"4294967295":{"number":"4294967295","timestamp":"[00:00:01.000]","en":"","zh":""}}}"#;
        let zero = r#"{"plate":"zero","rows":{"0":{"number":"0","timestamp":"[00:00:01.000]","en":"","zh":""}}}"#;
        fs::write(dir.path().join("top.json"), top).unwrap();
        fs::write(dir.path().join("zero.json"), zero).unwrap();

        let store = RowStore::new(dir.path());
        assert!(!store.initialize("top").unwrap());
        assert_eq!(store.append(Timestamp::from_millis(0), "first").unwrap().number, 1);
        assert!(!store.initialize("zero").unwrap());
        assert_eq!(store.next_index(), 1);
    }

    #[test]
    fn append_stops_at_the_last_index() {
        let dir = TempDir::new().unwrap();
        let store = RowStore::new(dir.path());
        store.initialize("demo").unwrap();
        store.set_row(MAX_INDEX, row(MAX_INDEX, 0, "last", "")).unwrap();

        assert!(matches!(
            store.append(Timestamp::from_millis(0), "one too many"),
            Err(SubdictError::IndexExhausted)
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn set_row_enforces_number_and_range() {
        let dir = TempDir::new().unwrap();
        let store = RowStore::new(dir.path());
        store.initialize("demo").unwrap();

        assert!(matches!(
            store.set_row(2, row(3, 0, "wrong key", "")),
            Err(SubdictError::RowNumberMismatch { key: 2, .. })
        ));
        assert!(matches!(
            store.set_row(0, row(0, 0, "zero", "")),
            Err(SubdictError::RowNumberOutOfRange(0))
        ));
        assert!(matches!(
            store.set_row(u32::MAX, row(u32::MAX, 0, "top", "")),
            Err(SubdictError::RowNumberOutOfRange(_))
        ));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn concurrent_appends_get_dense_unique_indices() {
        use std::sync::Arc;
        use std::thread;

        const THREADS: u32 = 8;
        const PER_THREAD: u32 = 50;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(RowStore::new(dir.path()));
        store.initialize("demo").unwrap();

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        let en = format!("{}-{}", t, i);
                        store.append(Timestamp::from_millis(u64::from(i)), &en).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let rows = store.get_data();
        let keys: Vec<u32> = rows.keys().copied().collect();
        assert_eq!(keys, (1..=THREADS * PER_THREAD).collect::<Vec<_>>());
        assert!(rows.iter().all(|(key, row)| row.number == *key));
        assert_eq!(store.next_index(), THREADS * PER_THREAD + 1);
    }

    #[test]
    fn invalid_rows_make_the_dictionary_corrupt() {
        let dir = TempDir::new().unwrap();
        let bad_number = r#"{"plate":"a","rows":{"1":{"number":"2","timestamp":"[00:00:01.000]","en":"","zh":""}}}"#;
        let bad_timestamp = r#"{"plate":"b","rows":{"1":{"number":"1","timestamp":"00:00:01","en":"","zh":""}}}"#;
        fs::write(dir.path().join("a.json"), bad_number).unwrap();
        fs::write(dir.path().join("b.json"), bad_timestamp).unwrap();

        let store = RowStore::new(dir.path());
        assert!(!store.initialize("a").unwrap());
        assert!(!store.initialize("b").unwrap());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn save_without_session_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = RowStore::new(dir.path().join("plates"));
        assert_eq!(store.save().unwrap(), None);
        assert!(!dir.path().join("plates").exists());
    }

    #[test]
    fn last_row_is_the_highest_index() {
        let dir = TempDir::new().unwrap();
        let store = RowStore::new(dir.path());
        store.initialize("demo").unwrap();
        assert_eq!(store.last_row(), None);
        store.set_row(3, row(3, 0, "three", "")).unwrap();
        store.set_row(1, row(1, 0, "one", "")).unwrap();
        assert_eq!(store.last_row().unwrap().en, "three");
    }
}
