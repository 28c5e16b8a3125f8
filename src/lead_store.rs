use crate::{
    error::{LeadError, Result},
    log_internal,
};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Fields every lead must carry before it is accepted into the pending queue.
pub const REQUIRED_FIELDS: [&str; 4] = ["company", "industry", "business_type", "location"];

/// A prospective business.  Serialized as a flat JSON object of string fields.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Lead(BTreeMap<String, String>);

impl Lead {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn company(&self) -> &str {
        self.get("company").unwrap_or("<unknown-company>")
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

/// Persistent lead storage: the pending queue plus the per-lead file directory.
pub struct LeadStore {
    pub queue: PendingQueue,
    pub files: LeadDir,
}

impl LeadStore {
    pub fn new(queue_path: impl Into<PathBuf>, lead_dir: impl Into<PathBuf>) -> Self {
        Self {
            queue: PendingQueue::new(queue_path),
            files: LeadDir::new(lead_dir),
        }
    }

    /// Create the queue document and the lead directory if they do not exist yet.
    pub async fn init(&self) -> Result<()> {
        self.queue.init().await?;
        self.files.init().await
    }
}

/// Leads waiting for an email draft, stored as one JSON array.
///
/// Every mutation is a read-modify-write of the whole document.  Callers serialize access.
pub struct PendingQueue {
    path: PathBuf,
}

impl PendingQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn init(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        write_json(&self.path, &Vec::<Lead>::new()).await
    }

    async fn load(&self) -> Result<Vec<Lead>> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Validate and stamp a new lead, then append it to the back of the queue.
    pub async fn append_lead(&mut self, mut fields: BTreeMap<String, String>) -> Result<Lead> {
        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .into_iter()
            .filter(|field| !fields.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return Err(LeadError::Validation { missing });
        }

        fields.insert("added_at".to_owned(), chrono::Local::now().to_rfc3339());
        let lead = Lead(fields);

        let mut leads = match self.load().await {
            Ok(leads) => leads,
            Err(LeadError::Json(e)) => {
                log_internal!(
                    "Pending queue `{}` is unreadable ({}), starting a new one",
                    self.path.to_string_lossy(),
                    e
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        leads.push(lead.clone());
        write_json(&self.path, &leads).await?;

        Ok(lead)
    }

    /// Remove and return the oldest pending lead.
    ///
    /// The lead is gone from disk before the caller acts on it: a crash after this returns loses
    /// the lead.
    pub async fn pop_next_lead(&mut self) -> Result<Option<Lead>> {
        let mut leads = self.load().await?;
        if leads.is_empty() {
            return Ok(None);
        }
        let lead = leads.remove(0);
        write_json(&self.path, &leads).await?;
        Ok(Some(lead))
    }

    /// Drop a lead whose email draft has been written.  Returns whether it was still queued.
    pub async fn complete_lead(&mut self, lead: &Lead) -> Result<bool> {
        let mut leads = self.load().await?;
        match leads.iter().position(|pending| pending == lead) {
            Some(0) => Ok(self.pop_next_lead().await?.is_some()),
            Some(pos) => {
                leads.remove(pos);
                write_json(&self.path, &leads).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn list_pending(&self) -> Result<PendingLeads> {
        Ok(PendingLeads(self.load().await?))
    }
}

/// Snapshot of the pending queue.  May be iterated any number of times.
#[derive(Clone, Debug, Default)]
pub struct PendingLeads(Vec<Lead>);

impl PendingLeads {
    pub fn iter(&self) -> std::slice::Iter<'_, Lead> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<Lead> {
        self.0
    }
}

impl<'a> IntoIterator for &'a PendingLeads {
    type Item = &'a Lead;
    type IntoIter = std::slice::Iter<'a, Lead>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Directory holding one JSON file per processed lead.
#[derive(Clone, Debug)]
pub struct LeadDir {
    path: PathBuf,
}

/// Result of looking up a lead file by exact name or substring.
#[derive(Debug, PartialEq, Eq)]
pub struct FileMatch {
    pub name: String,
    /// Number of files the query matched.  More than one means the first was picked.
    pub candidates: usize,
}

impl FileMatch {
    pub fn is_ambiguous(&self) -> bool {
        self.candidates > 1
    }
}

impl LeadDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    // Lead file names come from chat, so never let them escape the directory.
    fn file_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(LeadError::NotFound(format!("Lead file `{}`", name)));
        }
        Ok(self.path.join(name))
    }

    /// Sorted names of all `.json` files in the directory.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".json") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn exists(&self, name: &str) -> bool {
        match self.file_path(name) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn read(&self, name: &str) -> Result<Value> {
        let path = self.file_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(LeadError::NotFound(format!("Lead file `{}`", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write a lead file, replacing any existing file of the same name.
    pub async fn write_lead_file<T>(&self, name: &str, contents: &T) -> Result<()>
    where
        T: serde::Serialize + ?Sized,
    {
        let path = self.file_path(name)?;
        write_json(&path, contents).await
    }

    /// Set a top-level key in a lead file.  Array documents get the key on their first record.
    pub async fn patch_lead_file(&self, name: &str, key: &str, value: Value) -> Result<()> {
        let mut doc = self.read(name).await?;

        let record = match &mut doc {
            Value::Object(map) => Some(map),
            Value::Array(items) => items.first_mut().and_then(Value::as_object_mut),
            _ => None,
        };
        let Some(record) = record else {
            return Err(LeadError::NotFound(format!("Lead record in `{}`", name)));
        };
        record.insert(key.to_owned(), value);

        self.write_lead_file(name, &doc).await
    }

    /// Find a lead file by exact name, falling back to a case-insensitive substring match.
    pub async fn resolve(&self, query: &str) -> Result<FileMatch> {
        let names = self.list().await?;
        if names.iter().any(|name| name == query) {
            return Ok(FileMatch {
                name: query.to_owned(),
                candidates: 1,
            });
        }

        let needle = query.to_lowercase();
        let matches: Vec<&String> = names
            .iter()
            .filter(|name| name.to_lowercase().contains(&needle))
            .collect();

        match matches.first() {
            Some(first) => Ok(FileMatch {
                name: (*first).clone(),
                candidates: matches.len(),
            }),
            None => Err(LeadError::NotFound(format!(
                "File matching `{}` in `{}`",
                query,
                self.path.to_string_lossy()
            ))),
        }
    }

    /// 1-based lookup into the sorted file list.
    pub async fn by_index(&self, index: usize) -> Result<String> {
        let names = self.list().await?;
        index
            .checked_sub(1)
            .and_then(|i| names.get(i))
            .cloned()
            .ok_or_else(|| {
                LeadError::NotFound(format!(
                    "Lead file #{} (valid numbers are 1 to {})",
                    index,
                    names.len()
                ))
            })
    }

    /// Company name recorded in a lead file, if the file has one.
    pub async fn company(&self, name: &str) -> Option<String> {
        let doc = self.read(name).await.ok()?;
        let record = match &doc {
            Value::Array(items) => items.first()?,
            other => other,
        };
        record.get("company")?.as_str().map(str::to_owned)
    }
}

async fn write_json<T>(path: &Path, contents: &T) -> Result<()>
where
    T: serde::Serialize + ?Sized,
{
    let serialized = serde_json::to_string_pretty(contents)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Write next to the target, then rename over it.
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".new");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, serialized).await?;
    tokio::fs::rename(&tmp_path, path).await?;

    Ok(())
}
