use std::fs;
use std::fs::{OpenOptions, create_dir_all};
use std::io::{Error, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::constants::WORKSPACE_DIR;

pub fn workspace_directory<X, P>(working_root_dir: X, dir_name: P) -> Result<PathBuf, Error>
where
    X: AsRef<Path>,
    P: AsRef<Path>,
{
    let dir = working_root_dir.as_ref().join(WORKSPACE_DIR).join(dir_name);

    create_dir_all(&dir)?;

    Ok(dir)
}

/// Writes `content` readable by the owner only. The file is written next to its destination
/// then renamed, a reader never sees a partially written file.
pub fn write_private_file(path: &Path, content: &str) -> Result<(), Error> {
    let file_name = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| Error::new(ErrorKind::InvalidInput, format!("invalid file path {}", path.display())))?;
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)
}
