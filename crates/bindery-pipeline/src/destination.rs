// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output path resolution and collision handling.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bindery_core::error::Result;
use tracing::{debug, info};

use crate::confirm::{CollisionConfirmer, CollisionDecision};

const FORBIDDEN: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Replace characters that are not allowed in file names with `_`.
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect()
}

/// Turns a resolved name into a free (or explicitly overwritable) path.
#[derive(Clone)]
pub struct DestinationResolver {
    confirmer: Arc<dyn CollisionConfirmer>,
}

impl DestinationResolver {
    pub fn new(confirmer: Arc<dyn CollisionConfirmer>) -> Self {
        Self { confirmer }
    }

    /// Resolve `raw_name` inside `base_dir`, creating the directory if needed.
    ///
    /// Returns `Ok(None)` when the user chose to abort this output.
    pub fn resolve(&self, raw_name: &str, base_dir: &Path) -> Result<Option<PathBuf>> {
        let stem = sanitize_name(raw_name);
        fs::create_dir_all(base_dir)?;

        let path = base_dir.join(format!("{stem}.pdf"));
        if !path.exists() {
            return Ok(Some(path));
        }

        let message = format!("{} already exists", path.display());
        match self.confirmer.confirm(&path, &message) {
            CollisionDecision::Overwrite => {
                info!(path = %path.display(), "overwriting existing output");
                Ok(Some(path))
            }
            CollisionDecision::Rename => {
                let renamed = (1usize..)
                    .map(|n| base_dir.join(format!("{stem}_{n}.pdf")))
                    .find(|candidate| !candidate.exists())
                    .unwrap_or(path);
                debug!(path = %renamed.display(), "renamed to avoid collision");
                Ok(Some(renamed))
            }
            CollisionDecision::Abort => {
                info!(path = %path.display(), "output aborted on collision");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::FixedDecision;

    fn resolver(decision: CollisionDecision) -> DestinationResolver {
        DestinationResolver::new(Arc::new(FixedDecision(decision)))
    }

    #[test]
    fn forbidden_characters_become_underscores() {
        assert_eq!(sanitize_name(r#"a\b/c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_name("報告 2026.v1"), "報告 2026.v1");
    }

    #[test]
    fn free_path_is_returned_without_asking() {
        let dir = tempfile::tempdir().unwrap();
        // Abort would be visible if the confirmer were consulted.
        let path = resolver(CollisionDecision::Abort)
            .resolve("Report:final", dir.path())
            .unwrap();
        assert_eq!(path, Some(dir.path().join("Report_final.pdf")));
    }

    #[test]
    fn base_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested/out");
        let path = resolver(CollisionDecision::Abort).resolve("a", &base).unwrap();
        assert!(base.is_dir());
        assert_eq!(path, Some(base.join("a.pdf")));
    }

    #[test]
    fn collision_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("a.pdf");
        fs::write(&existing, b"x").unwrap();
        fs::write(dir.path().join("a_1.pdf"), b"x").unwrap();
        fs::write(dir.path().join("a_3.pdf"), b"x").unwrap();

        assert_eq!(
            resolver(CollisionDecision::Overwrite).resolve("a", dir.path()).unwrap(),
            Some(existing)
        );
        assert_eq!(
            resolver(CollisionDecision::Rename).resolve("a", dir.path()).unwrap(),
            Some(dir.path().join("a_2.pdf"))
        );
        assert_eq!(resolver(CollisionDecision::Abort).resolve("a", dir.path()).unwrap(), None);
    }
}
