//! ### CP/M Display Module
//!
//! Catalog rendering: turning a set of parsed files into the kind of
//! listing a `DIR` command would print. Kept deliberately small — no
//! on-disk format decisions live here, only presentation of what
//! [`super::CpmDisk::read_directory`] already parsed.

use super::CpmFile;

/// One line per file, `user:name.ext size-in-bytes [flags]`, sorted by
/// user then name — the same grouping `read_directory` itself uses.
pub fn catalog(files: &[CpmFile]) -> String {
    let mut out = String::new();
    for f in files {
        let mut flags = String::new();
        if f.attributes.read_only {
            flags.push('R');
        }
        if f.attributes.system {
            flags.push('S');
        }
        if f.attributes.archived {
            flags.push('A');
        }
        out.push_str(&format!(
            "{:2}:{:<12} {:>8} {}\n",
            f.user, f.name, f.size, flags
        ));
    }
    out
}

/// Grouped-by-user tree view, used where a caller wants the user areas
/// broken out explicitly (§1 "user-area scoping").
pub fn tree(files: &[CpmFile]) -> String {
    use std::collections::BTreeMap;
    let mut by_user: BTreeMap<u8, Vec<&CpmFile>> = BTreeMap::new();
    for f in files {
        by_user.entry(f.user).or_default().push(f);
    }
    let mut out = String::new();
    for (user, files) in by_user {
        out.push_str(&format!("user {}\n", user));
        for f in files {
            out.push_str(&format!("  {:<12} {:>8}\n", f.name, f.size));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::Attributes;

    fn f(user: u8, name: &str, size: usize) -> CpmFile {
        CpmFile {
            user,
            name: name.to_string(),
            size,
            attributes: Attributes::default(),
            extents: Vec::new(),
        }
    }

    #[test]
    fn catalog_lists_every_file() {
        let files = vec![f(0, "HELLO.COM", 1024), f(0, "WORLD.TXT", 512)];
        let out = catalog(&files);
        assert!(out.contains("HELLO.COM"));
        assert!(out.contains("WORLD.TXT"));
    }

    #[test]
    fn tree_groups_by_user() {
        let files = vec![f(0, "A.COM", 1), f(1, "B.COM", 2)];
        let out = tree(&files);
        assert!(out.contains("user 0"));
        assert!(out.contains("user 1"));
    }
}
