//! Container diffing: which source blobs are missing at the destination.
//!
//! Identity is exact, case-sensitive name equality; content is never
//! compared. Recomputing the diff on every run is what makes the pipeline
//! resumable without a checkpoint store: blobs that already arrived are
//! simply absent from the next to-copy set.

use super::traits::BlobInfo;
use std::collections::HashSet;
use tracing::info;

/// Result of diffing a source container against a destination container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDiff {
    /// Source blobs absent at the destination, in source listing order.
    pub to_copy: Vec<BlobInfo>,

    /// Number of source blobs already present at the destination.
    pub already_present: usize,
}

impl ContainerDiff {
    /// Total source blobs considered.
    pub fn source_total(&self) -> usize {
        self.to_copy.len() + self.already_present
    }
}

/// Compute the set of source blobs absent at the destination.
pub fn diff_containers(source: &[BlobInfo], destination: &[BlobInfo]) -> ContainerDiff {
    let existing: HashSet<&str> = destination.iter().map(|b| b.name.as_str()).collect();

    let mut to_copy = Vec::new();
    let mut already_present = 0;

    for blob in source {
        if existing.contains(blob.name.as_str()) {
            already_present += 1;
        } else {
            to_copy.push(blob.clone());
        }
    }

    info!(
        "Container diff: {} to copy, {} already present",
        to_copy.len(),
        already_present
    );

    ContainerDiff {
        to_copy,
        already_present,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(names: &[&str]) -> Vec<BlobInfo> {
        names
            .iter()
            .map(|n| BlobInfo {
                name: n.to_string(),
                size: 100,
            })
            .collect()
    }

    fn names(diff: &ContainerDiff) -> Vec<&str> {
        diff.to_copy.iter().map(|b| b.name.as_str()).collect()
    }

    #[test]
    fn test_partial_overlap() {
        let diff = diff_containers(&blobs(&["a", "b", "c"]), &blobs(&["a"]));
        assert_eq!(names(&diff), vec!["b", "c"]);
        assert_eq!(diff.already_present, 1);
        assert_eq!(diff.source_total(), 3);
    }

    #[test]
    fn test_empty_destination_copies_everything() {
        let diff = diff_containers(&blobs(&["x", "y"]), &[]);
        assert_eq!(names(&diff), vec!["x", "y"]);
        assert_eq!(diff.already_present, 0);
    }

    #[test]
    fn test_identical_containers_copy_nothing() {
        let source = blobs(&["a", "b"]);
        let diff = diff_containers(&source, &source.clone());
        assert!(diff.to_copy.is_empty());
        assert_eq!(diff.already_present, 2);
    }

    #[test]
    fn test_source_order_preserved() {
        let diff = diff_containers(&blobs(&["z", "m", "a", "q"]), &blobs(&["m"]));
        assert_eq!(names(&diff), vec!["z", "a", "q"]);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let diff = diff_containers(&blobs(&["Video.mp4"]), &blobs(&["video.mp4"]));
        assert_eq!(names(&diff), vec!["Video.mp4"]);
        assert_eq!(diff.already_present, 0);
    }

    #[test]
    fn test_destination_extras_ignored() {
        let diff = diff_containers(&blobs(&["a"]), &blobs(&["a", "orphan"]));
        assert!(diff.to_copy.is_empty());
        assert_eq!(diff.already_present, 1);
    }

    #[test]
    fn test_empty_source() {
        let diff = diff_containers(&[], &blobs(&["a"]));
        assert!(diff.to_copy.is_empty());
        assert_eq!(diff.already_present, 0);
    }
}
