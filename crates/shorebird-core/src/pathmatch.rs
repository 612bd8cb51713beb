//! Host path resolution: expand a glob pattern, require exactly one match.

use std::path::PathBuf;

use crate::error::PathMatchError;

/// Expands `pattern` against the local filesystem and returns the single
/// matching path. Zero or multiple matches fail with the observed count;
/// the caller's diagnostics can then tell "not mounted yet" from
/// "ambiguous mount".
///
/// Resolution is never cached: the underlying mount can change between
/// attempts, so every reconciliation resolves afresh.
pub fn single_path_match(pattern: &str) -> Result<PathBuf, PathMatchError> {
    let paths = glob::glob(pattern).map_err(|source| PathMatchError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut matches = Vec::new();
    for entry in paths {
        matches.push(entry?);
    }

    if matches.len() != 1 {
        return Err(PathMatchError::CountMismatch {
            pattern: pattern.to_string(),
            count: matches.len(),
        });
    }
    Ok(matches.remove(0))
}
