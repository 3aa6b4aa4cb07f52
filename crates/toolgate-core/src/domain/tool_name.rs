//! Tool name normalization.
//!
//! Tool names arrive in several conventions: dotted (`fs.writeFile`),
//! underscored (`fs_writeFile`), slash or colon namespaced (`fs/writeFile`,
//! `fs::writeFile`) and a handful of legacy spellings (`write_file`, `bash`).
//! [`normalize`] maps all of them to one canonical form. Routing and the
//! confirmation policy only ever see canonical names.

/// Characters treated as namespace separators.
const SEPARATORS: [char; 4] = ['.', '_', '/', ':'];

/// Legacy spellings and their canonical names.
///
/// Keys are already separator-normalized (dotted). Every alias must point at a
/// canonical name that is itself a fixed point of [`normalize`].
pub const ALIASES: &[(&str, &str)] = &[
    // filesystem
    ("read.file", "fs.readFile"),
    ("readFile", "fs.readFile"),
    ("cat", "fs.readFile"),
    ("write.file", "fs.writeFile"),
    ("writeFile", "fs.writeFile"),
    ("create.file", "fs.writeFile"),
    ("edit.file", "fs.editFile"),
    ("editFile", "fs.editFile"),
    ("delete.file", "fs.deleteFile"),
    ("rm", "fs.deleteFile"),
    ("list.dir", "fs.listDir"),
    ("list.directory", "fs.listDir"),
    ("ls", "fs.listDir"),
    ("move.file", "fs.moveFile"),
    ("mv", "fs.moveFile"),
    // shell / process execution
    ("bash", "shell.exec"),
    ("sh", "shell.exec"),
    ("shell", "shell.exec"),
    ("run.command", "shell.exec"),
    ("runCommand", "shell.exec"),
    ("exec", "shell.exec"),
    ("execute.command", "shell.exec"),
    // misc built-ins
    ("now", "time.now"),
    ("current.time", "time.now"),
];

/// Collapse separators into single dots and trim surrounding separators.
///
/// Case is preserved: `writeFile` and `writefile` are different names.
#[must_use]
pub fn canonical_separators(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for ch in raw.trim().chars() {
        if SEPARATORS.contains(&ch) {
            pending_separator = true;
            continue;
        }
        if pending_separator && !out.is_empty() {
            out.push('.');
        }
        pending_separator = false;
        out.push(ch);
    }

    out
}

/// Look up a separator-normalized name in the alias table.
#[must_use]
pub fn resolve_alias(name: &str) -> Option<&'static str> {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
}

/// Normalize a raw tool name into its canonical form.
///
/// Returns `None` for names that are empty after trimming separators.
#[must_use]
pub fn normalize(raw: &str) -> Option<String> {
    let dotted = canonical_separators(raw);
    if dotted.is_empty() {
        return None;
    }
    Some(resolve_alias(&dotted).map_or(dotted, str::to_string))
}

/// Whether some alias key starts with `prefix.`.
///
/// A name namespaced under such a prefix could be rewritten by [`normalize`]
/// and never resolve, so server ids must not be alias namespaces.
#[must_use]
pub fn is_alias_namespace(prefix: &str) -> bool {
    ALIASES.iter().any(|(alias, _)| {
        alias
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'))
    })
}

/// Join a server id and a remote tool name into a namespaced canonical name.
#[must_use]
pub fn qualify(server_id: &str, remote_name: &str) -> String {
    let remote = canonical_separators(remote_name);
    format!("{}.{remote}", canonical_separators(server_id))
}

/// Split a canonical name into lowercase words.
///
/// Dotted segments and camelCase humps are both word boundaries:
/// `fs.writeFile` → `["fs", "write", "file"]`.
#[must_use]
pub fn words(canonical: &str) -> Vec<String> {
    let mut words = Vec::new();

    for segment in canonical.split(['.', '-']) {
        let mut current = String::new();
        let mut prev_lower = false;
        for ch in segment.chars() {
            if ch.is_uppercase() && prev_lower && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
            current.extend(ch.to_lowercase());
        }
        if !current.is_empty() {
            words.push(current);
        }
    }

    words
}
