//! Path arithmetic.
//!
//! Resolution in the VFS is purely textual: a path is made absolute
//! against the caller's working directory, normalized (`.`, `..` and
//! repeated slashes collapse; `..` at the root stays at the root), and
//! only then matched against the mount table. Filesystems receive the
//! suffix below their mount point and never see `.` or `..`.

use alloc::string::String;
use alloc::vec::Vec;

/// Normalize `path`, resolving it against `cwd` (itself absolute and
/// normalized) when relative. The result is absolute, starts with `/`,
/// and has no empty, `.` or `..` components.
pub fn normalize(path: &str, cwd: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    if !path.starts_with('/') {
        stack.extend(cwd.split('/').filter(|c| !c.is_empty()));
    }
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                // Past the root stays at the root.
                let _ = stack.pop();
            }
            c => stack.push(c),
        }
    }

    let mut out = String::with_capacity(path.len() + 1);
    for c in &stack {
        out.push('/');
        out.push_str(c);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Components of a normalized path, in order.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Split a normalized path into its parent and final component.
/// The root has no parent.
pub fn split_parent(path: &str) -> Option<(&str, &str)> {
    let cut = path.rfind('/')?;
    let name = &path[cut + 1..];
    if name.is_empty() {
        return None;
    }
    let parent = if cut == 0 { "/" } else { &path[..cut] };
    Some((parent, name))
}

/// Does `prefix` (a normalized mount point) cover `path`?
fn prefix_covers(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path.strip_prefix(prefix)
        .map_or(false, |rest| rest.is_empty() || rest.starts_with('/'))
}

/// The longest mount prefix covering `path`, among `mounts`.
pub fn longest_prefix<'a>(path: &str, mounts: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    mounts
        .filter(|m| prefix_covers(m, path))
        .max_by_key(|m| m.len())
}

/// The part of `path` below the mount point `prefix`, without a leading
/// slash. Empty means the mount root itself.
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> &'a str {
    let rest = if prefix == "/" {
        path
    } else {
        &path[prefix.len()..]
    };
    rest.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_absolute() {
        assert_eq!(normalize("/", "/"), "/");
        assert_eq!(normalize("/a/b", "/"), "/a/b");
        assert_eq!(normalize("//a///b/", "/"), "/a/b");
        assert_eq!(normalize("/a/./b/.", "/"), "/a/b");
        assert_eq!(normalize("/a/b/..", "/"), "/a");
        assert_eq!(normalize("/a/../../..", "/"), "/");
        assert_eq!(normalize("/../x", "/"), "/x");
    }

    #[test]
    fn normalize_relative_uses_cwd() {
        assert_eq!(normalize("c", "/a/b"), "/a/b/c");
        assert_eq!(normalize("../c", "/a/b"), "/a/c");
        assert_eq!(normalize(".", "/a/b"), "/a/b");
        assert_eq!(normalize("..", "/"), "/");
    }

    #[test]
    fn split_parent_cases() {
        assert_eq!(split_parent("/a/b"), Some(("/a", "b")));
        assert_eq!(split_parent("/a"), Some(("/", "a")));
        assert_eq!(split_parent("/"), None);
    }

    #[test]
    fn longest_prefix_wins() {
        let mounts = ["/", "/proc", "/mnt", "/mnt/usb"];
        let find = |p| longest_prefix(p, mounts.iter().copied()).unwrap();
        assert_eq!(find("/proc/meminfo"), "/proc");
        assert_eq!(find("/mnt/usb/f"), "/mnt/usb");
        assert_eq!(find("/mnt/usbx"), "/");
        assert_eq!(find("/etc/passwd"), "/");
        assert_eq!(find("/proc"), "/proc");
    }

    #[test]
    fn strip_prefix_cases() {
        assert_eq!(strip_prefix("/proc/meminfo", "/proc"), "meminfo");
        assert_eq!(strip_prefix("/proc", "/proc"), "");
        assert_eq!(strip_prefix("/a/b", "/"), "a/b");
        assert_eq!(strip_prefix("/", "/"), "");
    }
}
