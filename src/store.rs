use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

use crate::error::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

/// File name of the study guide table inside the data directory.
pub const STORE_FILE: &str = "study_guide.json.gz";

/// One row of the study guide table.
///
/// A guide is the set of rows sharing a title for a user. The row created
/// by [`StudyGuideStore::create_guide`] has an empty equation and only
/// marks the guide's existence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyGuideRecord {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub equation: String,
    pub solution: String,
    pub steps: Value,
    pub created_at: DateTime<Utc>,
}

/// A guide as listed to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuideSummary {
    pub id: i64,
    pub title: String,
}

/// A saved equation within a guide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideEntry {
    pub id: i64,
    pub equation: String,
    pub solution: String,
    pub steps: Value,
}

/// Storage for study guides and their saved equations.
pub trait StudyGuideStore: Send + Sync {
    /// Guides owned by `user_id`, one per title, newest id first.
    fn list_guides(&self, user_id: &str) -> Result<Vec<GuideSummary>>;

    /// Create a guide, or return the id of the user's guide with that title.
    fn create_guide(&self, user_id: &str, title: &str) -> Result<i64>;

    /// Saved equations in the user's guide called `title`, oldest first.
    fn list_entries(&self, user_id: &str, title: &str) -> Result<Vec<GuideEntry>>;

    /// Save an equation, its solution and its steps under `title`.
    fn append_entry(
        &self,
        user_id: &str,
        title: &str,
        equation: &str,
        solution: &str,
        steps: Value,
    ) -> Result<i64>;

    /// Look up one of the user's guides by any of its row ids.
    fn find_guide(&self, user_id: &str, id: i64) -> Result<Option<GuideSummary>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Table {
    next_id: i64,
    records: Vec<StudyGuideRecord>,
}

impl Table {
    fn insert(
        &mut self,
        user_id: &str,
        title: &str,
        equation: &str,
        solution: &str,
        steps: Value,
    ) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        self.records.push(StudyGuideRecord {
            id,
            user_id: user_id.to_string(),
            title: title.to_string(),
            equation: equation.to_string(),
            solution: solution.to_string(),
            steps,
            created_at: Utc::now(),
        });
        id
    }

    fn owned<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a StudyGuideRecord> {
        self.records.iter().filter(move |r| r.user_id == user_id)
    }
}

/// Study guides kept in a single gzip-compressed JSON file.
///
/// The whole table is held in memory and rewritten on every change; the
/// new file replaces the old one only once it has been fully written.
pub struct FileStore {
    path: PathBuf,
    table: Mutex<Table>,
}

impl FileStore {
    /// Open (or start) the store inside `data_dir`.
    ///
    /// # Arguments
    /// * `data_dir` - Directory holding the store file; created if missing
    ///
    /// # Returns
    /// * `Result<FileStore>` - The store, or an error if an existing file cannot be read
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(STORE_FILE);

        let table = if path.exists() {
            let reader = BufReader::new(GzDecoder::new(File::open(&path)?));
            let table: Table = serde_json::from_reader(reader)?;
            info!(
                "loaded {} study guide rows from {}",
                table.records.len(),
                path.display()
            );
            table
        } else {
            Table::default()
        };

        Ok(FileStore {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save(&self, table: &Table) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = NamedTempFile::new_in(dir)?;
        {
            let encoder = GzEncoder::new(tmp.as_file(), Compression::default());
            let mut writer = BufWriter::new(encoder);
            serde_json::to_writer(&mut writer, table)?;
            writer
                .into_inner()
                .map_err(|e| e.into_error())?
                .finish()?
                .sync_all()?;
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!("wrote {} rows to {}", table.records.len(), self.path.display());
        Ok(())
    }
}

fn check_title(title: &str) -> Result<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::EmptyTitle);
    }
    Ok(title)
}

impl StudyGuideStore for FileStore {
    fn list_guides(&self, user_id: &str) -> Result<Vec<GuideSummary>> {
        let table = self.lock();
        let mut rows: Vec<&StudyGuideRecord> = table.owned(user_id).collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));

        let mut seen = HashSet::new();
        Ok(rows
            .into_iter()
            .filter(|r| seen.insert(r.title.as_str()))
            .map(|r| GuideSummary {
                id: r.id,
                title: r.title.clone(),
            })
            .collect())
    }

    fn create_guide(&self, user_id: &str, title: &str) -> Result<i64> {
        let title = check_title(title)?;
        let mut table = self.lock();
        if let Some(existing) = table.owned(user_id).find(|r| r.title == title) {
            return Ok(existing.id);
        }

        let id = table.insert(user_id, title, "", "", Value::Array(Vec::new()));
        self.save(&table)?;
        Ok(id)
    }

    fn list_entries(&self, user_id: &str, title: &str) -> Result<Vec<GuideEntry>> {
        let title = title.trim();
        let table = self.lock();
        Ok(table
            .owned(user_id)
            .filter(|r| r.title == title && !r.equation.is_empty())
            .map(|r| GuideEntry {
                id: r.id,
                equation: r.equation.clone(),
                solution: r.solution.clone(),
                steps: r.steps.clone(),
            })
            .collect())
    }

    fn append_entry(
        &self,
        user_id: &str,
        title: &str,
        equation: &str,
        solution: &str,
        steps: Value,
    ) -> Result<i64> {
        let title = check_title(title)?;
        let mut table = self.lock();
        let id = table.insert(user_id, title, equation, solution, steps);
        if let Err(e) = self.save(&table) {
            table.records.pop();
            table.next_id -= 1;
            return Err(e);
        }
        Ok(id)
    }

    fn find_guide(&self, user_id: &str, id: i64) -> Result<Option<GuideSummary>> {
        let table = self.lock();
        Ok(table.owned(user_id).find(|r| r.id == id).map(|r| GuideSummary {
            id: r.id,
            title: r.title.clone(),
        }))
    }
}
