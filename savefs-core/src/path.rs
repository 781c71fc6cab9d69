//! POSIX-style path algebra.
//!
//! Everything here is pure string manipulation with `/` as the separator.
//! Backslashes are accepted on input and treated as separators.
//!
//! Two flavors of output exist:
//! - [`normalize`], [`join`] and [`resolve`] return display paths that keep a
//!   leading `/` for absolute input.
//! - [`require_path`] returns a store key: no leading or trailing slash, and
//!   the empty string is reserved for the root.

use crate::error::{VfsError, VfsResult};

/// Path separator. Always `/`.
pub const SEPARATOR: char = '/';

/// PATH-list separator. Always `:`.
pub const DELIMITER: char = ':';

/// Normalize a path, resolving `.` and `..` and collapsing repeated separators.
///
/// # Examples
/// ```
/// use savefs_core::path::normalize;
/// assert_eq!(normalize("/app/data/../config/./settings.json"), "/app/config/settings.json");
/// assert_eq!(normalize(""), ".");
/// assert_eq!(normalize("/"), "/");
/// assert_eq!(normalize("../a/../../b"), "../../b");
/// ```
pub fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with(SEPARATOR);
    let mut stack: Vec<&str> = Vec::new();

    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => match stack.last() {
                Some(&last) if last != ".." => {
                    stack.pop();
                }
                _ if !absolute => stack.push(".."),
                _ => {}
            },
            other => stack.push(other),
        }
    }

    let joined = stack.join("/");
    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Join segments with the separator and normalize the result.
///
/// ```
/// use savefs_core::path::join;
/// assert_eq!(join(["/app", "data", "save.json"]), "/app/data/save.json");
/// assert_eq!(join(["/app/", "/data"]), "/app/data");
/// ```
pub fn join<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = segments
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect();
    normalize(&parts.join("/"))
}

/// Resolve segments into a single path. The rightmost absolute segment
/// becomes the base; segments after it are appended.
///
/// ```
/// use savefs_core::path::resolve;
/// assert_eq!(resolve(["/app", "data", "save.json"]), "/app/data/save.json");
/// assert_eq!(resolve(["data", "/other", "file.txt"]), "/other/file.txt");
/// ```
pub fn resolve<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = segments
        .into_iter()
        .map(|s| s.as_ref().replace('\\', "/"))
        .collect();

    let base = parts
        .iter()
        .rposition(|p| p.starts_with(SEPARATOR))
        .unwrap_or(0);

    normalize(&parts[base..].join("/"))
}

/// Canonical store key for a path, or the empty string for the root.
pub(crate) fn store_key(path: &str) -> String {
    let normalized = normalize(path);
    let trimmed = normalized.trim_matches(SEPARATOR);
    if trimmed == "." {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Normalize a path into a non-root store key.
///
/// Fails with [`VfsError::EmptyPath`] when the path names the root, and with
/// [`VfsError::InvalidPath`] when a relative path climbs above the root.
pub fn require_path(path: &str) -> VfsResult<String> {
    let key = store_key(path);
    if key.is_empty() {
        return Err(VfsError::EmptyPath);
    }
    if key == ".." || key.starts_with("../") {
        return Err(VfsError::InvalidPath(path.to_string()));
    }
    Ok(key)
}

/// Parent of a store key. The empty string means the root.
pub fn parent_path(key: &str) -> &str {
    match key.rfind(SEPARATOR) {
        Some(idx) => &key[..idx],
        None => "",
    }
}

/// Last component of a path, optionally with `ext` stripped.
///
/// ```
/// use savefs_core::path::basename;
/// assert_eq!(basename("/app/data/save.json", None), "save.json");
/// assert_eq!(basename("/app/data/save.json", Some(".json")), "save");
/// assert_eq!(basename("/app/data/", None), "data");
/// ```
pub fn basename(path: &str, ext: Option<&str>) -> String {
    let trimmed = path.trim_end_matches(SEPARATOR);
    let name = trimmed.rsplit(SEPARATOR).next().unwrap_or("");
    match ext {
        Some(ext) if !ext.is_empty() => name.strip_suffix(ext).unwrap_or(name).to_string(),
        _ => name.to_string(),
    }
}

/// Directory portion of a path, or `/` when nothing remains.
///
/// ```
/// use savefs_core::path::dirname;
/// assert_eq!(dirname("/app/data/save.json"), "/app/data");
/// assert_eq!(dirname("/file.txt"), "/");
/// ```
pub fn dirname(path: &str) -> String {
    let trimmed = path.trim_end_matches(SEPARATOR);
    match trimmed.rfind(SEPARATOR) {
        Some(idx) if idx > 0 => trimmed[..idx].to_string(),
        _ => "/".to_string(),
    }
}

/// Extension of the last component including the dot. Dotfiles have none.
///
/// ```
/// use savefs_core::path::extname;
/// assert_eq!(extname("archive.tar.gz"), ".gz");
/// assert_eq!(extname(".gitignore"), "");
/// ```
pub fn extname(path: &str) -> String {
    let base = basename(path, None);
    match base.rfind('.') {
        Some(idx) if idx > 0 => base[idx..].to_string(),
        _ => String::new(),
    }
}

/// True if the path starts with `/`.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with(SEPARATOR)
}

/// Well-known application directories.
///
/// Without a native filesystem there are no real locations, so each one maps
/// to a virtual path under `/app`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseDirectory {
    AppData,
    AppLocalData,
    AppConfig,
    AppCache,
    AppLog,
    Desktop,
    Document,
    Download,
    Home,
    Audio,
    Picture,
    Public,
    Video,
    Resource,
    Temp,
}

impl BaseDirectory {
    /// Virtual path of this directory.
    pub fn path(self) -> &'static str {
        match self {
            BaseDirectory::AppData => "/app/data",
            BaseDirectory::AppLocalData => "/app/local-data",
            BaseDirectory::AppConfig => "/app/config",
            BaseDirectory::AppCache => "/app/cache",
            BaseDirectory::AppLog => "/app/log",
            BaseDirectory::Desktop => "/app/desktop",
            BaseDirectory::Document => "/app/documents",
            BaseDirectory::Download => "/app/downloads",
            BaseDirectory::Home => "/app/home",
            BaseDirectory::Audio => "/app/audio",
            BaseDirectory::Picture => "/app/pictures",
            BaseDirectory::Public => "/app/public",
            BaseDirectory::Video => "/app/videos",
            BaseDirectory::Resource => "/app/resources",
            BaseDirectory::Temp => "/app/temp",
        }
    }

    /// Join a relative path onto this directory.
    pub fn join(self, relative: &str) -> String {
        join([self.path(), relative])
    }
}
