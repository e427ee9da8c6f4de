//! Compiler-emitted dependency files
//!
//! Each compile writes a `make`-style rule beside its object file
//! (`-MMD -MP -MF`). The first rule's prerequisites are the source and
//! every header the compiler observed; the `-MP` phony rules that
//! follow are ignored.

use std::path::{Path, PathBuf};

use crate::system::{self, Error};

/// Prerequisites of the first rule in a depfile. Line continuations are
/// folded; a second `target:` token ends the scan.
pub fn read_prerequisites(d_path: &Path) -> Result<Vec<String>, Error> {
    let text = system::read_file(d_path)?;
    let mut deps = Vec::new();
    let mut seen_target = false;
    'scan: for line in text.lines() {
        let line = line.trim().trim_end_matches('\\').trim_end();
        for token in line.split_whitespace() {
            if token.ends_with(':') {
                if seen_target {
                    break 'scan;
                }
                seen_target = true;
                continue;
            }
            if seen_target {
                deps.push(token.to_string());
            }
        }
    }
    Ok(deps)
}

/// Decide whether a source must be recompiled.
///
/// Stale when the object or depfile is missing, when a recorded
/// prerequisite no longer exists, or when the source or any
/// prerequisite is newer than the object. Relative prerequisite paths
/// resolve against the project directory (compiles run with the
/// project directory as the child's working directory).
pub fn is_stale(root: &Path, source: &Path, o_path: &Path, d_path: &Path) -> Result<bool, Error> {
    if !o_path.exists() {
        return Ok(true);
    }
    if !d_path.exists() {
        return Ok(true);
    }
    let o_mtime = system::get_modified_time(o_path)?;
    if system::get_modified_time(source)? > o_mtime {
        return Ok(true);
    }
    for dep in read_prerequisites(d_path)? {
        let dep_path = resolve(root, &dep);
        let d_mtime = match system::get_modified_time(&dep_path) {
            Ok(x) => x,
            // prerequisite disappeared; no known-good set
            Err(_) => return Ok(true),
        };
        if d_mtime > o_mtime {
            return Ok(true);
        }
    }
    Ok(false)
}

fn resolve(root: &Path, dep: &str) -> PathBuf {
    let path = Path::new(dep);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
