use std::path::{Path, PathBuf};

use crate::cli::OnConflict;

pub fn get_filename_from_path(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "upload".to_string())
}

pub fn sanitize_filename(filename: &str) -> String {
    filename.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-' && c != '_', "_")
}

pub fn get_unique_filepath(dir: &Path, filename: &str) -> PathBuf {
    let original = Path::new(filename);
    let file_stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let extension = original
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut path = dir.join(filename);
    let mut counter = 1;

    while path.exists() {
        let new_filename = if extension.is_empty() {
            format!("{}_{}", file_stem, counter)
        } else {
            format!("{}_{}.{}", file_stem, counter, extension)
        };

        path = dir.join(new_filename);
        counter += 1;
    }
    path
}

pub fn resolve_output_path(dir: &Path, filename: &str, on_conflict: OnConflict) -> PathBuf {
    let filename = sanitize_filename(filename);
    match on_conflict {
        OnConflict::Overwrite => dir.join(filename),
        OnConflict::Rename => get_unique_filepath(dir, &filename),
    }
}
