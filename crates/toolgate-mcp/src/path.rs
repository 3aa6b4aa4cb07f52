//! Command resolution and PATH handling for stdio servers.
//!
//! This module provides utilities to:
//! - Build the effective PATH for child processes (system paths plus `path_extra`)
//! - Resolve a bare command name (`npx`) against that PATH
//! - Validate working directories

use std::collections::HashSet;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Platform-specific PATH separator
#[cfg(unix)]
const PATH_SEPARATOR: &str = ":";
#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";

/// Default paths to include on macOS when PATH is limited (launchd, app bundles)
#[cfg(target_os = "macos")]
const MACOS_DEFAULT_PATHS: &str = "/opt/homebrew/bin:/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Validate a working directory.
pub fn validate_working_dir(cwd: &str) -> Result<(), String> {
    let path = Path::new(cwd);

    if !path.exists() {
        return Err(format!("Working directory does not exist: {cwd}"));
    }

    if !path.is_dir() {
        return Err(format!("Working directory path is not a directory: {cwd}"));
    }

    Ok(())
}

/// Build an effective PATH for the child process.
///
/// Order: `path_extra` entries, the current process PATH, then platform
/// defaults. Entries are deduplicated.
pub fn build_effective_path(path_extra: Option<&str>) -> OsString {
    let mut path_entries = Vec::new();

    if let Some(extra) = path_extra {
        path_entries.extend(split_path(extra));
    }

    if let Some(current_path) = env::var_os("PATH") {
        if let Some(current_path_str) = current_path.to_str() {
            path_entries.extend(split_path(current_path_str));
        }
    }

    #[cfg(target_os = "macos")]
    {
        path_entries.extend(split_path(MACOS_DEFAULT_PATHS));
    }

    let mut seen = HashSet::new();
    let deduped: Vec<String> = path_entries
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect();

    OsString::from(deduped.join(PATH_SEPARATOR))
}

fn split_path(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(PATH_SEPARATOR)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
}

/// Resolve a command to an executable file.
///
/// Commands containing a path separator are checked as-is; bare names are
/// searched for in `search_path`.
pub fn resolve_command(command: &str, search_path: &OsString) -> Result<PathBuf, String> {
    if command.contains(std::path::MAIN_SEPARATOR) || command.contains('/') {
        let path = PathBuf::from(command);
        return if is_executable(&path) {
            Ok(path)
        } else {
            Err(format!("Executable not found or not executable: {command}"))
        };
    }

    env::split_paths(search_path)
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| format!("Command '{command}' not found in PATH"))
}

fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
    }

    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_effective_path_puts_extra_first() {
        let path = build_effective_path(Some("/custom/bin"));
        let path_str = path.to_str().unwrap();
        assert!(path_str.starts_with("/custom/bin"));
    }

    #[test]
    fn test_build_effective_path_deduplicates() {
        let path = build_effective_path(Some("/custom/path:/custom/path"));
        let path_str = path.to_str().unwrap();

        let entries: Vec<&str> = path_str.split(PATH_SEPARATOR).collect();
        let count = entries.iter().filter(|&&e| e == "/custom/path").count();
        assert_eq!(count, 1, "PATH should deduplicate /custom/path");
    }

    #[test]
    fn test_validate_working_dir_rejects_nonexistent() {
        let result = validate_working_dir("/nonexistent/directory");
        assert!(result.unwrap_err().contains("does not exist"));
    }

    #[test]
    fn test_validate_working_dir_accepts_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_working_dir(dir.path().to_str().unwrap()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_command_searches_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("fake-server");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let search = OsString::from(dir.path());
        assert_eq!(resolve_command("fake-server", &search).unwrap(), exe);
        assert!(resolve_command("missing-server", &search).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_command_rejects_non_executable_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.txt");
        std::fs::write(&file, "not a program").unwrap();

        let search = OsString::new();
        assert!(resolve_command(file.to_str().unwrap(), &search).is_err());
    }
}
