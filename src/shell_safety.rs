//! Shell metacharacter and path traversal detection.
//!
//! Nothing in this crate hands a string to a shell interpreter; every spawn
//! goes through an argument vector. These checks run anyway, once in the
//! validator and again right before a child process is spawned, so a value
//! that slipped past one layer is still stopped by the other.

use std::path::{Component, Path};

/// Characters that change meaning when a shell sees them.
pub const DANGEROUS_CHARACTERS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>', '\\', '!', '"', '\'', '\n',
    '\r',
];

/// Returns true if `s` contains any shell metacharacter.
pub fn contains_dangerous_characters(s: &str) -> bool {
    s.chars().any(|c| DANGEROUS_CHARACTERS.contains(&c))
}

/// First offending character and its char position, for error messages.
pub fn find_dangerous_character(s: &str) -> Option<(usize, char)> {
    s.chars()
        .enumerate()
        .find(|(_, c)| DANGEROUS_CHARACTERS.contains(c))
}

/// Returns true if `s` contains a `..` path component or a NUL byte.
pub fn contains_path_traversal(s: &str) -> bool {
    if s.contains('\0') {
        return true;
    }
    // Check both separators regardless of platform.
    s.split(['/', '\\']).any(|part| part == "..")
        || Path::new(s)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
}

/// Quote a value for display in logs or copyable command lines.
///
/// POSIX single quoting: the only character needing treatment inside `'...'`
/// is `'` itself, written as `'\''`. Never used to build something we execute.
pub fn escape_shell_arg(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '^' | ','))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Render a program and its arguments as a single display string.
pub fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(escape_shell_arg(program))
        .chain(args.iter().map(|a| escape_shell_arg(a)))
        .collect::<Vec<_>>()
        .join(" ")
}
