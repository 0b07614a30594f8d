//! Source discovery.

use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::{Context, Result};

/// Extension of template source files.
pub const SOURCE_EXTENSION: &str = "st";

/// Expand `paths` into template files. Files are taken as given; directories
/// are searched recursively for `.st` files, in name order.
pub fn collect_sources(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk(path, &mut files)?;
        } else {
            files.push(path.clone());
        }
    }
    tracing::debug!(files = files.len(), "collected template sources");
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .wrap_err_with(|| format!("failed to read directory '{}'", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION) {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directories_are_searched_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.st"), "").unwrap();
        fs::write(dir.path().join("a.st"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::write(dir.path().join("nested").join("c.st"), "").unwrap();

        let files = collect_sources(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.st"),
                PathBuf::from("b.st"),
                PathBuf::from("nested").join("c.st"),
            ]
        );
    }

    #[test]
    fn test_files_are_taken_as_given() {
        let files = collect_sources(&[PathBuf::from("missing.txt")]).unwrap();
        assert_eq!(files, vec![PathBuf::from("missing.txt")]);
    }
}
