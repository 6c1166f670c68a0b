use std::path::{Component, Path, PathBuf};

use itertools::Itertools;

use crate::error::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadTask {
    pub local_path: PathBuf,
    pub destination_key: String,
    pub container: String,
    pub overwrite: bool,
}

impl UploadTask {
    pub fn new(root: &Path, local_path: PathBuf, container: &str, overwrite: bool) -> Result<Self, Error> {
        let destination_key = destination_key(root, &local_path)?;
        Ok(Self {
            local_path,
            destination_key,
            container: container.to_owned(),
            overwrite,
        })
    }
}

/// Strip `root` from `path` and join the remaining components with `/`.
pub fn destination_key(root: &Path, path: &Path) -> Result<String, Error> {
    let invalid = || Error::InvalidPath(path.to_owned());
    let relative = path.strip_prefix(root).map_err(|_| invalid())?;
    let segments = relative
        .components()
        .map(|c| match c {
            Component::Normal(segment) => segment.to_str().ok_or_else(invalid),
            _ => Err(invalid()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if segments.is_empty() {
        return Err(invalid());
    }
    Ok(segments.into_iter().join("/"))
}
