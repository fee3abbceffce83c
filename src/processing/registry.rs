//! Helpers deriving the file registry from stored chunk metadata.

use crate::store::{SourceFilter, StoredChunk};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Distinct base file names of every ingested document, sorted.
pub(crate) fn distinct_documents(entries: &[StoredChunk]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            Path::new(&entry.metadata.source)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| entry.metadata.document.clone())
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Chunks that belong to the filtered document.
pub(crate) fn matching_entries<'a>(
    entries: &'a [StoredChunk],
    filter: &SourceFilter,
) -> Vec<&'a StoredChunk> {
    entries
        .iter()
        .filter(|entry| filter.matches(&entry.metadata))
        .collect()
}

/// Files on disk owned by the service for the given chunks.
///
/// The upload copy is always owned. The original source is only owned when it was staged inside
/// `media_dir` by an HTTP upload; sources elsewhere belong to the caller and are left alone.
pub(crate) fn owned_files(entries: &[&StoredChunk], media_dir: &Path) -> BTreeSet<PathBuf> {
    let mut files = BTreeSet::new();
    for entry in entries {
        if !entry.metadata.stored_path.is_empty() {
            files.insert(PathBuf::from(&entry.metadata.stored_path));
        }
        let source = Path::new(&entry.metadata.source);
        if source.starts_with(media_dir) {
            files.insert(source.to_path_buf());
        }
    }
    files
}

/// Drop the files that chunks still in the store point at.
///
/// Two sources with the same base name share one upload copy, so deleting one of them must not
/// take the copy away from the other.
pub(crate) fn unreferenced_files(
    mut files: BTreeSet<PathBuf>,
    remaining: &[StoredChunk],
) -> BTreeSet<PathBuf> {
    for entry in remaining {
        files.remove(Path::new(&entry.metadata.stored_path));
        files.remove(Path::new(&entry.metadata.source));
    }
    files
}

/// Remove `files`, logging failures instead of propagating them.
pub(crate) async fn remove_files_best_effort(files: BTreeSet<PathBuf>) {
    for path in files {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed document file"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Document file already absent");
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "Failed to remove document file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceMatch;
    use crate::store::ChunkMetadata;

    fn entry(source: &str, document: &str, stored_path: &str) -> StoredChunk {
        StoredChunk {
            id: format!("{source}-id"),
            text: "text".into(),
            metadata: ChunkMetadata {
                source: source.into(),
                document: document.into(),
                stored_path: stored_path.into(),
                chunk_index: 0,
                chunk_hash: String::new(),
                ingested_at: String::new(),
            },
        }
    }

    #[test]
    fn documents_are_deduplicated_and_sorted() {
        let entries = vec![
            entry("media/report.pdf", "report.pdf", "uploads/report.pdf"),
            entry("/home/me/notes.docx", "notes.docx", "uploads/notes.docx"),
            entry("media/report.pdf", "report.pdf", "uploads/report.pdf"),
            entry("/tmp/report.pdf", "report.pdf", "uploads/report.pdf"),
        ];
        assert_eq!(
            distinct_documents(&entries),
            vec!["notes.docx".to_string(), "report.pdf".to_string()]
        );
        assert!(distinct_documents(&[]).is_empty());
    }

    #[test]
    fn matching_respects_filter_mode() {
        let entries = vec![
            entry("media/report.pdf", "report.pdf", "uploads/report.pdf"),
            entry("media/old_report.pdf", "old_report.pdf", "uploads/old_report.pdf"),
        ];
        let exact = SourceFilter::new("report.pdf", SourceMatch::Exact);
        assert_eq!(matching_entries(&entries, &exact).len(), 1);

        let contains = SourceFilter::new("report.pdf", SourceMatch::Contains);
        assert_eq!(matching_entries(&entries, &contains).len(), 2);
    }

    #[test]
    fn caller_sources_are_not_owned() {
        let staged = entry("media/report.pdf", "report.pdf", "uploads/report.pdf");
        let external = entry("/home/me/notes.docx", "notes.docx", "uploads/notes.docx");
        let files = owned_files(&[&staged, &external], Path::new("media"));
        let expected: BTreeSet<PathBuf> = [
            "media/report.pdf",
            "uploads/notes.docx",
            "uploads/report.pdf",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(files, expected);
    }

    #[test]
    fn files_still_referenced_are_kept() {
        let deleted = entry("/a/report.pdf", "report.pdf", "uploads/report.pdf");
        let survivor = entry("/b/report.pdf", "report.pdf", "uploads/report.pdf");
        let staged = entry("media/memo.pdf", "memo.pdf", "uploads/memo.pdf");

        let owned = owned_files(&[&deleted, &staged], Path::new("media"));
        let files = unreferenced_files(owned, std::slice::from_ref(&survivor));
        let expected: BTreeSet<PathBuf> = ["media/memo.pdf", "uploads/memo.pdf"]
            .into_iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(files, expected);

        let owned = owned_files(&[&deleted], Path::new("media"));
        assert_eq!(unreferenced_files(owned.clone(), &[]), owned);
    }

    #[tokio::test]
    async fn removal_tolerates_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let present = dir.path().join("a.pdf");
        std::fs::write(&present, b"x").expect("write");
        let files: BTreeSet<PathBuf> = [present.clone(), dir.path().join("gone.pdf")]
            .into_iter()
            .collect();
        remove_files_best_effort(files).await;
        assert!(!present.exists());
    }
}
