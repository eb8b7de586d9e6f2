use std::collections::HashSet;
use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use super::{ScanError, ScanOptions};
use crate::extractor::{EntityEntry, ExtractionTestResult, NameExtractionRule, NameExtractor};

type WalkIter = Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + Send>;

/// Lazy sequence of candidates under one root.
///
/// Call [`scan_entries`] again to restart from the beginning.
pub struct ScanEntries {
    inner: WalkIter,
    depth: usize,
    extractor: NameExtractor,
}

impl Iterator for ScanEntries {
    type Item = Result<EntityEntry, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(entry) => {
                    if entry.depth() != self.depth {
                        continue;
                    }
                    let is_dir = entry.file_type().is_dir();
                    return Some(Ok(self.extractor.entry_for(entry.path(), is_dir)));
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    return Some(Err(ScanError::Io {
                        path,
                        reason: e.to_string(),
                    }));
                }
            }
        }
    }
}

/// Walk `root` and yield every entry exactly `entity_depth + 1` levels down.
pub fn scan_entries(root: &Path, options: &ScanOptions) -> Result<ScanEntries, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::RootNotFound(root.display().to_string()));
    }
    let extractor = NameExtractor::new(&options.rules)?;
    let ignored: HashSet<String> = options
        .ignored_names
        .iter()
        .map(|name| name.to_lowercase())
        .collect();
    let depth = options.entity_depth + 1;

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| !is_ignored(entry, &ignored));

    Ok(ScanEntries {
        inner: Box::new(walker),
        depth,
        extractor,
    })
}

fn is_ignored(entry: &DirEntry, ignored: &HashSet<String>) -> bool {
    if entry.depth() == 0 || ignored.is_empty() {
        return false;
    }
    let name = entry.file_name().to_string_lossy().to_lowercase();
    ignored.contains(&name)
}

/// Preview what a rule set extracts under `path`, ignoring nothing.
pub fn test_extraction_rules(
    path: &Path,
    entity_depth: usize,
    rules: &[NameExtractionRule],
) -> Result<Vec<ExtractionTestResult>, ScanError> {
    let options = ScanOptions {
        entity_depth,
        ignored_names: Vec::new(),
        rules: rules.to_vec(),
    };
    scan_entries(path, &options)?
        .map(|entry| entry.map(ExtractionTestResult::from))
        .collect()
}
