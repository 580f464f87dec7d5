//! Linear scan of a database folder for the first image matching a probe.

use crate::types::Verification;
use crate::verifier::Verifier;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("database folder not found: {}", .0.display())]
    DatabaseNotFound(PathBuf),
    #[error("database path is not a folder: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("input image not found: {}", .0.display())]
    ProbeNotFound(PathBuf),
    #[error("cannot list database folder {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The database entry that matched the probe.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseMatch {
    pub path: PathBuf,
    /// File name as shown to users.
    pub name: String,
    pub verification: Verification,
}

/// An entry the scan could not evaluate.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

/// Result of scanning a database folder.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub matched: Option<DatabaseMatch>,
    /// Entries handed to the verifier, including the match and failures.
    pub examined: usize,
    pub skipped: Vec<SkippedEntry>,
}

impl ScanReport {
    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}

/// List a database folder, sorted by file name.
pub fn list_database(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(entries)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Verify `probe` against each file in `database` and stop at the first match.
///
/// Entries the verifier fails on are logged, recorded in the report, and
/// skipped. Subdirectories are skipped without calling the verifier. A missing
/// database folder or probe is an error and the verifier is never called.
pub fn scan_database<V: Verifier + ?Sized>(
    database: &Path,
    probe: &Path,
    verifier: &mut V,
) -> Result<ScanReport, ScanError> {
    if !database.exists() {
        return Err(ScanError::DatabaseNotFound(database.to_path_buf()));
    }
    if !database.is_dir() {
        return Err(ScanError::NotADirectory(database.to_path_buf()));
    }
    if !probe.is_file() {
        return Err(ScanError::ProbeNotFound(probe.to_path_buf()));
    }

    let entries = list_database(database).map_err(|source| ScanError::Io {
        path: database.to_path_buf(),
        source,
    })?;
    tracing::info!(
        database = %database.display(),
        probe = %probe.display(),
        entries = entries.len(),
        "scanning database"
    );

    let mut report = ScanReport::default();
    for path in entries {
        let name = display_name(&path);

        if !path.is_file() {
            tracing::debug!(entry = %name, "skipping non-file entry");
            report.skipped.push(SkippedEntry {
                name,
                reason: "not a regular file".to_string(),
            });
            continue;
        }

        report.examined += 1;
        match verifier.verify(probe, &path) {
            Ok(verification) if verification.verified => {
                tracing::info!(entry = %name, distance = verification.distance, "match found");
                report.matched = Some(DatabaseMatch { path, name, verification });
                return Ok(report);
            }
            Ok(verification) => {
                tracing::debug!(entry = %name, distance = verification.distance, "no match");
            }
            Err(e) => {
                tracing::warn!(entry = %name, error = %e, "error processing database entry");
                report.skipped.push(SkippedEntry {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::info!(examined = report.examined, skipped = report.skipped.len(), "no match found");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DistanceMetric;
    use crate::verifier::VerifyError;
    use std::fs;

    fn verdict(verified: bool) -> Result<Verification, VerifyError> {
        let distance = if verified { 0.2 } else { 0.9 };
        Ok(Verification::decide(distance, 0.68, DistanceMetric::Cosine))
    }

    /// Database folder with the given files plus a probe image outside it.
    fn fixture(files: &[&str]) -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let db = root.path().join("database");
        fs::create_dir(&db).unwrap();
        for f in files {
            fs::write(db.join(f), b"img").unwrap();
        }
        let probe = root.path().join("probe.jpg");
        fs::write(&probe, b"img").unwrap();
        (root, db, probe)
    }

    fn name_of(path: &Path) -> String {
        path.file_name().unwrap().to_string_lossy().into_owned()
    }

    #[test]
    fn test_empty_database_reports_no_match() {
        let (_root, db, probe) = fixture(&[]);
        let mut calls = 0;
        let mut verifier = |_: &Path, _: &Path| {
            calls += 1;
            verdict(true)
        };

        let report = scan_database(&db, &probe, &mut verifier).unwrap();
        assert!(!report.is_match());
        assert_eq!(report.examined, 0);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_first_true_entry_wins_and_stops() {
        let (_root, db, probe) = fixture(&["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);
        let mut seen = Vec::new();
        let mut verifier = |_: &Path, reference: &Path| {
            let name = name_of(reference);
            seen.push(name.clone());
            verdict(name == "b.jpg" || name == "d.jpg")
        };

        let report = scan_database(&db, &probe, &mut verifier).unwrap();
        let matched = report.matched.unwrap();
        assert_eq!(matched.name, "b.jpg");
        assert_eq!(matched.path, db.join("b.jpg"));
        assert!(matched.verification.verified);
        assert_eq!(report.examined, 2);
        assert_eq!(seen, vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_only_match_is_last_entry() {
        let (_root, db, probe) = fixture(&["1.png", "2.png", "3.png"]);
        let mut verifier = |_: &Path, reference: &Path| verdict(name_of(reference) == "3.png");

        let report = scan_database(&db, &probe, &mut verifier).unwrap();
        assert_eq!(report.matched.map(|m| m.name).as_deref(), Some("3.png"));
        assert_eq!(report.examined, 3);
    }

    #[test]
    fn test_failing_entries_are_skipped() {
        let (_root, db, probe) = fixture(&["a.jpg", "b.txt", "c.jpg", "d.jpg"]);
        let mut verifier = |_: &Path, reference: &Path| match name_of(reference).as_str() {
            "a.jpg" | "b.txt" => Err(VerifyError::NoFaceDetected(reference.to_path_buf())),
            "c.jpg" => verdict(true),
            _ => verdict(false),
        };

        let report = scan_database(&db, &probe, &mut verifier).unwrap();
        assert_eq!(report.matched.as_ref().map(|m| m.name.as_str()), Some("c.jpg"));
        let skipped: Vec<&str> = report.skipped.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(skipped, vec!["a.jpg", "b.txt"]);
        assert!(report.skipped[0].reason.contains("no face detected"));
    }

    #[test]
    fn test_all_entries_failing_is_no_match() {
        let (_root, db, probe) = fixture(&["a.jpg", "b.jpg"]);
        let mut verifier =
            |_: &Path, reference: &Path| Err(VerifyError::NoFaceDetected(reference.to_path_buf()));

        let report = scan_database(&db, &probe, &mut verifier).unwrap();
        assert!(!report.is_match());
        assert_eq!(report.examined, 2);
        assert_eq!(report.skipped.len(), 2);
    }

    #[test]
    fn test_missing_database_never_calls_verifier() {
        let (root, _db, probe) = fixture(&[]);
        let missing = root.path().join("no-such-folder");
        let mut calls = 0;
        let mut verifier = |_: &Path, _: &Path| {
            calls += 1;
            verdict(true)
        };

        let err = scan_database(&missing, &probe, &mut verifier).unwrap_err();
        assert!(matches!(err, ScanError::DatabaseNotFound(_)));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_missing_probe_never_calls_verifier() {
        let (root, db, _probe) = fixture(&["a.jpg"]);
        let mut calls = 0;
        let mut verifier = |_: &Path, _: &Path| {
            calls += 1;
            verdict(true)
        };

        let err = scan_database(&db, &root.path().join("nope.jpg"), &mut verifier).unwrap_err();
        assert!(matches!(err, ScanError::ProbeNotFound(_)));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_database_path_is_a_file() {
        let (_root, db, probe) = fixture(&["a.jpg"]);
        let mut verifier = |_: &Path, _: &Path| verdict(true);

        let err = scan_database(&db.join("a.jpg"), &probe, &mut verifier).unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory(_)));
    }

    #[test]
    fn test_subdirectories_are_skipped_without_verifying() {
        let (_root, db, probe) = fixture(&["b.jpg"]);
        fs::create_dir(db.join("a-nested")).unwrap();
        let mut seen = Vec::new();
        let mut verifier = |_: &Path, reference: &Path| {
            seen.push(name_of(reference));
            verdict(true)
        };

        let report = scan_database(&db, &probe, &mut verifier).unwrap();
        assert_eq!(seen, vec!["b.jpg"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name, "a-nested");
        assert_eq!(report.matched.unwrap().name, "b.jpg");
    }

    #[test]
    fn test_list_database_sorted() {
        let (_root, db, _probe) = fixture(&["zeta.jpg", "alpha.jpg", "mid.png"]);
        let names: Vec<String> = list_database(&db).unwrap().iter().map(|p| name_of(p)).collect();
        assert_eq!(names, vec!["alpha.jpg", "mid.png", "zeta.jpg"]);
    }
}
