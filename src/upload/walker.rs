use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::Error;

/// Lazily yield every file under `root`, at any depth and in filesystem order.
///
/// Directories are never yielded themselves, so empty ones contribute nothing.
/// Symbolic links to files are yielded, links to directories are not followed.
/// The first unreadable directory stops the walk with `DirectoryUnreadable`.
pub fn walk(root: &Path) -> impl Iterator<Item = Result<PathBuf, Error>> {
    let root = root.to_owned();
    let mut failed = false;
    WalkDir::new(&root)
        .into_iter()
        .map_while(move |entry| {
            if failed {
                return None;
            }
            match entry {
                Ok(entry) => Some(Ok(is_file(&entry).then(|| entry.into_path()))),
                Err(err) => {
                    failed = true;
                    let path = err.path().unwrap_or(&root).to_owned();
                    Some(Err(Error::DirectoryUnreadable {
                        path,
                        reason: err
                            .io_error()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| err.to_string()),
                    }))
                }
            }
        })
        .filter_map(Result::transpose)
}

fn is_file(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    file_type.is_file() || (file_type.is_symlink() && entry.path().is_file())
}

/// Check that `root` exists and is a directory before walking it.
pub fn check_root(root: &Path) -> Result<(), Error> {
    let metadata = std::fs::metadata(root).map_err(|err| Error::DirectoryUnreadable {
        path: root.to_owned(),
        reason: err.to_string(),
    })?;
    if !metadata.is_dir() {
        return Err(Error::DirectoryUnreadable {
            path: root.to_owned(),
            reason: "not a directory".to_owned(),
        });
    }
    Ok(())
}
