//! Атомарная запись файлов
//!
//! Файл сначала пишется во временный файл в той же директории, затем
//! переименовывается на место. Читатели никогда не видят недописанный файл.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Result, TtsBookError};

/// Записать файл атомарно; содержимое формирует `write`.
pub fn write_atomic<P, F>(path: P, write: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut File) -> Result<()>,
{
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| {
        TtsBookError::Storage(format!("Failed to create {}: {}", parent.display(), e))
    })?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| {
        TtsBookError::Storage(format!("Failed to create temp file in {}: {}", parent.display(), e))
    })?;

    write(temp.as_file_mut())?;
    temp.as_file_mut()
        .sync_all()
        .map_err(|e| TtsBookError::Storage(format!("Failed to sync {}: {}", path.display(), e)))?;

    temp.persist(path).map_err(|e| {
        TtsBookError::Storage(format!("Failed to move file into {}: {}", path.display(), e.error))
    })?;

    log::debug!("Wrote {}", path.display());
    Ok(())
}

/// Атомарно записать строку
pub fn write_string_atomic<P: AsRef<Path>>(path: P, contents: &str) -> Result<()> {
    write_atomic(path, |file| {
        file.write_all(contents.as_bytes())?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_string_atomic_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");
        write_string_atomic(&path, "hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");

        write_string_atomic(&path, "replaced").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "replaced");
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.txt");
        let result = write_atomic(&path, |_| Err(TtsBookError::Storage("boom".to_string())));
        assert!(result.is_err());
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
