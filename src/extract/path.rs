use std::path::{Component, Path, PathBuf};

use super::ExtractError;

/// Resolve an archive entry name against the destination directory.
///
/// The name is joined and normalized lexically — `.` segments are
/// dropped and `..` segments pop a previously accumulated segment —
/// without touching the filesystem. Any name that would land outside
/// `dest` (absolute paths, drive prefixes, traversal that pops past the
/// root) fails with [`ExtractError::PathEscape`].
///
/// Only the textual path is checked; symlink targets on disk are not
/// inspected.
pub fn resolve_entry_path(dest: &Path, name: &str) -> Result<PathBuf, ExtractError> {
    let mut resolved = PathBuf::new();

    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(ExtractError::PathEscape(name.to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::PathEscape(name.to_string()));
            }
        }
    }

    Ok(dest.join(resolved))
}
