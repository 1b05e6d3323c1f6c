//! Path helpers for local key and payload files.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir, fs_utf8::File};
use std::io;

/// Expands a leading `~` or `~/` to the user's home directory.
///
/// If `HOME` is not set the input is returned unchanged.
///
/// # Examples
///
/// ```
/// # use kiln::session::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/.ssh/id_rsa"), format!("{home}/.ssh/id_rsa"));
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    let Some(home) = std::env::var_os("HOME") else {
        return path.to_owned();
    };
    let home_dir = home.to_string_lossy();
    if path == "~" {
        return home_dir.into_owned();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return format!("{home_dir}/{rest}");
    }
    path.to_owned()
}

/// Opens `path` for reading through an ambient directory handle.
pub(crate) fn open_local(path: &Utf8Path) -> io::Result<File> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    Dir::open_ambient_dir(parent, ambient_authority())?.open(file_name)
}

/// Reads `path` into a string through an ambient directory handle.
pub(crate) fn read_local(path: &Utf8Path) -> io::Result<String> {
    let mut contents = String::new();
    io::Read::read_to_string(&mut open_local(path)?, &mut contents)?;
    Ok(contents)
}
