//! Files served from a directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A file read from disk.
#[derive(Debug, Clone)]
pub struct StaticFile {
    /// File contents.
    pub body: Vec<u8>,
    /// Guessed from the extension; `application/octet-stream` when unknown.
    pub content_type: String,
}

/// Joins `rel` onto `root`, refusing anything that would climb out of it.
pub fn resolve(root: &Path, rel: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for part in rel.split('/') {
        match part {
            "" | "." => {}
            ".." => return None,
            p if p.contains('\\') || p.contains(':') => return None,
            p => path.push(p),
        }
    }
    Some(path)
}

/// Reads `rel` under `root`.
///
/// `Ok(None)` means there is nothing to serve: the path escapes the root
/// (by `..` or through a symlink), does not exist, or names a directory.
///
/// # Errors
///
/// Any other I/O failure.
pub fn load(root: &Path, rel: &str) -> io::Result<Option<StaticFile>> {
    let Some(path) = resolve(root, rel) else {
        return Ok(None);
    };
    let (Some(root), Some(path)) = (canonical(root)?, canonical(&path)?) else {
        return Ok(None);
    };
    if !path.starts_with(&root) || path.is_dir() {
        return Ok(None);
    }
    match fs::read(&path) {
        Ok(body) => Ok(Some(StaticFile {
            body,
            content_type: mime_guess::from_path(&path)
                .first_or_octet_stream()
                .to_string(),
        })),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn canonical(path: &Path) -> io::Result<Option<PathBuf>> {
    match fs::canonicalize(path) {
        Ok(path) => Ok(Some(path)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rejects_traversal() {
        let root = Path::new("/srv/static");
        assert_eq!(
            resolve(root, "css/a.css"),
            Some(PathBuf::from("/srv/static/css/a.css"))
        );
        assert_eq!(resolve(root, "./a//b"), Some(PathBuf::from("/srv/static/a/b")));
        assert_eq!(resolve(root, "../etc/passwd"), None);
        assert_eq!(resolve(root, "css/../../x"), None);
        assert_eq!(resolve(root, "..\\x"), None);
    }

    #[test]
    fn test_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/a.css"), "p { color: red }").unwrap();

        let file = load(dir.path(), "css/a.css").unwrap().unwrap();
        assert_eq!(file.content_type, "text/css");
        assert_eq!(file.body, b"p { color: red }");

        assert!(load(dir.path(), "css").unwrap().is_none());
        assert!(load(dir.path(), "missing.js").unwrap().is_none());
        assert!(load(dir.path(), "../a.css").unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_load_refuses_symlinks_out_of_root() {
        use std::os::unix::fs::symlink;

        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.css"), "p {}").unwrap();
        symlink(outside.path().join("secret.txt"), dir.path().join("leak.txt")).unwrap();
        symlink(outside.path(), dir.path().join("out")).unwrap();
        symlink(dir.path().join("a.css"), dir.path().join("alias.css")).unwrap();

        assert!(load(dir.path(), "leak.txt").unwrap().is_none());
        assert!(load(dir.path(), "out/secret.txt").unwrap().is_none());
        let file = load(dir.path(), "alias.css").unwrap().unwrap();
        assert_eq!(file.body, b"p {}");
    }
}
