//! Filename canonicalisation (§6 "CP/M name canonicalisation"): accepts
//! `NAME.EXT` case-insensitively, rejects the characters CP/M never
//! allowed in a name, and produces the upper-case space-padded 8+3 form
//! actually stored in a directory entry.

use super::types::{Error, INVALID_CHARS};

/// Split an optional `user:` prefix (as in `0:HELLO.COM`) from the
/// filename portion. Returns `(user, name)`; `user` is `None` when no
/// prefix was given.
pub fn split_user_filename(xname: &str) -> Result<(Option<u8>, &str), Error> {
    if let Some((user_str, rest)) = xname.split_once(':') {
        let user: u8 = user_str.parse().map_err(|_| Error::InvalidName)?;
        Ok((Some(user), rest))
    } else {
        Ok((None, xname))
    }
}

/// Canonicalise `name` (without a user prefix) into the upper-case,
/// space-padded 8+3 `(base[8], ext[3])` CP/M stores on disk.
pub fn canonicalize_name(name: &str) -> Result<([u8; 8], [u8; 3]), Error> {
    if name.is_empty() || name.chars().any(|c| INVALID_CHARS.contains(c) || !c.is_ascii()) {
        return Err(Error::InvalidName);
    }
    let upper = name.to_uppercase();
    let mut parts = upper.splitn(2, '.');
    let base = parts.next().unwrap_or("");
    let ext = parts.next().unwrap_or("");
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return Err(Error::InvalidName);
    }
    let mut base_bytes = [b' '; 8];
    for (i, b) in base.bytes().enumerate() {
        base_bytes[i] = b;
    }
    let mut ext_bytes = [b' '; 3];
    for (i, b) in ext.bytes().enumerate() {
        ext_bytes[i] = b;
    }
    Ok((base_bytes, ext_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_is_uppercased_and_padded() {
        let (base, ext) = canonicalize_name("hello.c").unwrap();
        assert_eq!(&base, b"HELLO   ");
        assert_eq!(&ext, b"C  ");
    }

    #[test]
    fn empty_base_is_rejected() {
        assert!(canonicalize_name(".COM").is_err());
    }

    #[test]
    fn invalid_characters_rejected() {
        assert!(canonicalize_name("BAD*NAME.COM").is_err());
    }

    #[test]
    fn user_prefix_is_split() {
        let (user, rest) = split_user_filename("3:HELLO.COM").unwrap();
        assert_eq!(user, Some(3));
        assert_eq!(rest, "HELLO.COM");
    }

    #[test]
    fn no_prefix_returns_none() {
        let (user, rest) = split_user_filename("HELLO.COM").unwrap();
        assert_eq!(user, None);
        assert_eq!(rest, "HELLO.COM");
    }
}
