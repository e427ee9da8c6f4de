//! Document evaluation
//!
//! Phase order matters: includes are expanded first (folding `<dict>`
//! entries at the point they appear), then a single top-down pass
//! substitutes `{key}` tokens and prunes guarded subtrees. Includes are
//! structural splices into the parent's child list, not imports.

use std::path::{Path, PathBuf};

use crate::build::dict::SubstMap;
use crate::build::document::{self, Element};
use crate::build::guard;
use crate::system::{Error, PathExt};

/// Load a `-i` dictionary file. Entries rank below `-s` pairs.
pub fn seed_dict_file(path: &Path, map: &mut SubstMap) -> Result<(), Error> {
    let origin = path.display().to_string();
    let doc = document::load(path)?;
    if doc.name != "dicts" {
        return Err(Error::BadRoot(origin, "dicts".to_string(), doc.name));
    }
    for child in &doc.children {
        if child.name != "dict" {
            return Err(Error::BadDictRoot(origin, child.name.clone()));
        }
        let key = child
            .attr("key")
            .ok_or_else(|| Error::MissingDictKey(origin.clone(), child.line))?;
        map.seed_soft(key, &child.text);
    }
    Ok(())
}

/// Expand `<include>` elements in place, transitively. `file` is the
/// document the element tree was loaded from; include paths are
/// relative to it. `chain` holds the canonical paths currently being
/// included, for cycle detection.
pub fn inline_includes(
    element: &mut Element,
    file: &Path,
    map: &mut SubstMap,
    chain: &mut Vec<PathBuf>,
) -> Result<(), Error> {
    let base = file.parent().unwrap_or_else(|| Path::new("."));
    let origin = file.display().to_string();
    let mut i = 0;
    while i < element.children.len() {
        let child = &element.children[i];
        let at = format!("{} (line {})", origin, child.line);
        match child.name.as_str() {
            "dict" => {
                if !guard_allows(child, map, &at)? {
                    element.children.remove(i);
                    continue;
                }
                fold_dict(&element.children[i], map, &at)?;
                i += 1;
            }
            "include" => {
                if !guard_allows(child, map, &at)? {
                    element.children.remove(i);
                    continue;
                }
                let rel = map.substitute(&child.text, &at)?;
                let target = base.join(&rel);
                let canonical = target.canonicalize2()?;
                if chain.contains(&canonical) {
                    let shown = chain
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(" -> ");
                    return Err(Error::IncludeCycle(canonical.display().to_string(), shown));
                }
                let mut included = document::load(&target)?;
                if included.name != "pyInc" {
                    return Err(Error::BadIncludeRoot(
                        target.display().to_string(),
                        "pyInc".to_string(),
                        included.name,
                    ));
                }
                chain.push(canonical);
                inline_includes(&mut included, &target, map, chain)?;
                chain.pop();
                let count = included.children.len();
                element.children.splice(i..i + 1, included.children);
                i += count;
            }
            _ => {
                let child = &mut element.children[i];
                inline_includes(child, file, map, chain)?;
                i += 1;
            }
        }
    }
    Ok(())
}

/// The substitution and guard pass: expand `{key}` tokens in every
/// attribute and text node, prune elements whose `if` evaluates false,
/// and fold `<dict>` elements before their later siblings.
///
/// `<pre_op>`/`<post_op>` text is left untouched here; it is
/// substituted during plan assembly, once `{ccprefix}` exists.
pub fn evaluate(root: &mut Element, map: &mut SubstMap, origin: &str) -> Result<(), Error> {
    let at = format!("{} (line {})", origin, root.line);
    substitute_attrs(root, map, &at)?;
    root.text = map.substitute(&root.text, &at)?;
    evaluate_children(root, map, origin)
}

fn evaluate_children(element: &mut Element, map: &mut SubstMap, origin: &str) -> Result<(), Error> {
    let mut i = 0;
    while i < element.children.len() {
        let at = format!("{} (line {})", origin, element.children[i].line);
        if !guard_allows(&element.children[i], map, &at)? {
            element.children.remove(i);
            continue;
        }
        let child = &mut element.children[i];
        substitute_attrs(child, map, &at)?;
        match child.name.as_str() {
            "dict" => fold_dict(child, map, &at)?,
            "pre_op" | "post_op" => {}
            _ => {
                child.text = map.substitute(&child.text, &at)?;
                evaluate_children(child, map, origin)?;
            }
        }
        i += 1;
    }
    Ok(())
}

fn guard_allows(element: &Element, map: &SubstMap, at: &str) -> Result<bool, Error> {
    match element.attr("if") {
        Some(cond) => {
            let cond = map.substitute(cond, at)?;
            guard::eval(&cond, at)
        }
        None => Ok(true),
    }
}

fn substitute_attrs(element: &mut Element, map: &SubstMap, at: &str) -> Result<(), Error> {
    for idx in 0..element.attrs.len() {
        let value = map.substitute(&element.attrs[idx].1, at)?;
        element.attrs[idx].1 = value;
    }
    Ok(())
}

/// Fold a `<dict>` element into the map. The value is substituted
/// eagerly so later lookups return token-free text.
fn fold_dict(element: &Element, map: &mut SubstMap, at: &str) -> Result<(), Error> {
    let key = element
        .attr("key")
        .ok_or_else(|| Error::MissingDictKey(at.to_string(), element.line))?;
    let value = map.substitute(&element.text, at)?;
    map.insert(key, &value);
    Ok(())
}
