use std::env;
use std::path::PathBuf;

/// Normalize a database path: ensure a `.db` extension and make absolute.
#[must_use]
pub fn normalize_db_path(name_or_path: Option<&str>) -> PathBuf {
    let stem = name_or_path.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("lsmlite");
    let mut path = PathBuf::from(stem);
    if path.extension().is_none() {
        path.set_extension("db");
    }
    if path.is_relative() {
        path = env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(path);
    }
    path
}
