use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::model::{ActionHandle, ResultItem};
use crate::source::{QueryContext, Source, SourceError, SourceMetadata, SourceOutput};

use super::match_score;

pub const FILE_SOURCE_ID: &str = "files";
const CANCEL_CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

#[derive(Debug)]
pub struct FileSource {
    roots: Vec<PathBuf>,
    max_depth: usize,
    entries: RwLock<Vec<FileEntry>>,
}

impl FileSource {
    pub fn new(roots: Vec<PathBuf>, max_depth: usize) -> Self {
        Self {
            roots,
            max_depth,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn metadata(&self) -> SourceMetadata {
        SourceMetadata::global(FILE_SOURCE_ID, "Files")
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn scan(&self) -> Vec<FileEntry> {
        let mut out = Vec::new();
        for root in &self.roots {
            if !root.exists() {
                warn!(root = %root.display(), "file root does not exist");
                continue;
            }
            for entry in WalkDir::new(root)
                .min_depth(1)
                .max_depth(self.max_depth)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let Some(name) = entry.file_name().to_str() else {
                    continue;
                };
                if name.starts_with('.') {
                    continue;
                }
                out.push(FileEntry {
                    name: name.to_string(),
                    path: entry.path().to_path_buf(),
                    is_dir: entry.file_type().is_dir(),
                });
            }
        }
        out
    }
}

impl Source for FileSource {
    fn query(&self, ctx: &QueryContext<'_>) -> Result<SourceOutput, SourceError> {
        let search = ctx.query.search.as_str();
        let entries = self.entries.read();
        let mut results = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            if index % CANCEL_CHECK_INTERVAL == 0 && ctx.is_cancelled() {
                debug!(scanned = index, "file query cancelled");
                break;
            }
            let path = entry.path.to_string_lossy();
            let score = match_score(ctx.matcher, search, &entry.name, &path);
            if score == 0 {
                continue;
            }
            results.push(
                ResultItem::new(&entry.name, &path)
                    .with_score(score)
                    .with_icon(if entry.is_dir { "folder" } else { "file" })
                    .with_history_key(&path)
                    .with_action(ActionHandle::OpenPath {
                        path: path.to_string(),
                    }),
            );
        }
        Ok(results.into())
    }

    fn context_menu(&self, selected: &ResultItem) -> Result<Vec<ResultItem>, SourceError> {
        let Some(parent) = Path::new(&selected.subtitle).parent() else {
            return Ok(Vec::new());
        };
        let folder = parent.to_string_lossy();
        Ok(vec![ResultItem::new("Open containing folder", &folder)
            .with_icon("folder")
            .with_action(ActionHandle::OpenPath {
                path: folder.to_string(),
            })])
    }

    fn reload(&self) -> Result<usize, SourceError> {
        let scanned = self.scan();
        let count = scanned.len();
        *self.entries.write() = scanned;
        debug!(count, "file index rebuilt");
        Ok(count)
    }
}
