//! The build pipeline
//!
//! Strictly sequential: pre-ops, prebuilds, compiles, link or archive,
//! post-ops. The first failing child aborts the run and its exit code
//! becomes the orchestrator's.

use std::path::{Path, PathBuf};

use crate::build::compile::Compiler;
use crate::build::dict::{self, SubstMap};
use crate::build::paths::Paths;
use crate::build::plan::{self, ArtifactKind, Plan, PrebuildRef};
use crate::build::{depfile, document, resolve};
use crate::system::{self, ChildBuilder, Error, PathExt};
use crate::Options;

/// Run a build as described by the command-line options. `depth` is
/// the prebuild nesting level, zero for the top-level invocation.
pub fn run(options: &Options, depth: usize) -> Result<(), Error> {
    let file = Path::new(&options.file).canonicalize2()?;
    let root = file
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| Error::NotFound(options.file.clone()))?;
    let origin = file.display().to_string();

    // seed the substitution map: -s pairs, -i files, then {config}
    let mut map = SubstMap::new();
    for entry in &options.subs {
        for (key, value) in dict::parse_pairs(entry)? {
            map.seed(&key, &value);
        }
    }
    for dict_file in &options.dicts {
        resolve::seed_dict_file(Path::new(dict_file), &mut map)?;
    }
    map.seed("config", &options.config);

    // load and inline includes
    let mut doc = document::load(&file)?;
    let mut chain = vec![file.clone()];
    resolve::inline_includes(&mut doc, &file, &mut map, &mut chain)?;
    if options.dump {
        system::hintln!("Document", "{origin} after include expansion");
        print!("{}", doc.to_xml());
    }

    // substitute and prune
    resolve::evaluate(&mut doc, &mut map, &origin)?;
    if options.dump {
        system::hintln!("Document", "{origin} after substitution");
        print!("{}", doc.to_xml());
    }

    // select toolchain/configuration and flatten
    let plan = plan::assemble(&doc, &origin, &root, &mut map, &options.config)?;
    let paths = Paths::new(root, &options.config, &plan.artifact);

    if options.clean {
        clean(&paths)?;
    }
    system::ensure_directory(&paths.output)?;

    let compiler = Compiler::new(&plan, &paths);

    if let Some(one) = &options.only {
        return compile_one(one, &plan, &paths, &compiler);
    }

    if depth == 0 {
        system::infoln!(
            "Building",
            "{} (configuration `{}`)",
            plan.artifact,
            options.config
        );
    } else {
        system::infoln!(
            "Building",
            "{} (configuration `{}`, prebuild level {})",
            plan.artifact,
            options.config,
            depth
        );
    }

    preflight(&compiler)?;
    run_ops(&plan.pre_ops, &paths.root)?;
    if options.prebuilds {
        run_prebuilds(&plan, options, &paths.root, depth)?;
    }
    let outcome = compile_all(&plan, &paths, &compiler)?;
    link_if_needed(&plan, &paths, &compiler, &outcome)?;
    run_ops(&plan.post_ops, &paths.root)?;

    system::infoln!(
        "Finished",
        "{} (configuration `{}`)",
        plan.artifact,
        options.config
    );
    Ok(())
}

/// Remove and recreate the configuration's output tree.
pub fn clean(paths: &Paths) -> Result<(), Error> {
    system::infoln!("Cleaning", "{}", paths.output.display());
    system::remove_directory(&paths.output)?;
    system::ensure_directory(&paths.output)
}

/// A missing driver should fail before any action runs, not midway
/// through the compile set.
fn preflight(compiler: &Compiler<'_>) -> Result<(), Error> {
    for driver in compiler.compile_drivers() {
        which::which(&driver).map_err(|_| Error::MissingTool(driver))?;
    }
    Ok(())
}

fn run_ops(ops: &[String], root: &Path) -> Result<(), Error> {
    for op in ops {
        system::infoln!("Running", "{op}");
        ChildBuilder::shell(op).current_dir(root).spawn()?.check()?;
    }
    Ok(())
}

/// The inherited invocation for a prebuild: current options, overridden
/// field-by-field by the `<project>` element, with `<sub>` entries
/// appended so they shadow same-key parent entries for the child only.
fn child_options(parent: &Options, pb: &PrebuildRef, root: &Path) -> Options {
    let dir = root.join(&pb.path);
    let file_name = match &pb.config_file {
        Some(name) => name.clone(),
        None => Path::new(&parent.file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pyMake.xml".to_string()),
    };
    let mut child = parent.clone();
    child.file = dir.join(file_name).display().to_string();
    if let Some(config) = &pb.configuration {
        child.config = config.clone();
    }
    if let Some(clean) = pb.clean {
        child.clean = clean;
    }
    if let Some(prebuilds) = pb.prebuilds {
        child.prebuilds = prebuilds;
    }
    child.subs.extend(pb.subs.iter().cloned());
    child.only = None;
    child
}

fn run_prebuilds(
    plan: &Plan,
    options: &Options,
    root: &Path,
    depth: usize,
) -> Result<(), Error> {
    for pb in &plan.prebuilds {
        let child = child_options(options, pb, root);
        system::infoln!(
            "Prebuild",
            "{} (configuration `{}`)",
            root.join(&pb.path).display(),
            child.config
        );
        run(&child, depth + 1)?;
    }
    Ok(())
}

struct CompileOutcome {
    /// Every object file, project-relative, in source order
    objects: Vec<String>,
    compiled_any: bool,
}

fn compile_all(
    plan: &Plan,
    paths: &Paths,
    compiler: &Compiler<'_>,
) -> Result<CompileOutcome, Error> {
    let mut objects = Vec::new();
    let mut compiled_any = false;
    for source in &plan.sources {
        let o_path = paths.object(&source.rel);
        let d_path = paths.depfile(&source.rel);
        objects.push(o_path.with_base(&paths.root).display().to_string());
        let source_abs = paths.root.join(&source.rel);
        if !depfile::is_stale(&paths.root, &source_abs, &o_path, &d_path)? {
            continue;
        }
        if let Some(parent) = o_path.parent() {
            system::ensure_directory(parent)?;
        }
        system::infoln!("Compiling", "{}", source.rel.display());
        compiler.compile(source).run(&paths.root)?;
        compiled_any = true;
    }
    Ok(CompileOutcome {
        objects,
        compiled_any,
    })
}

fn link_if_needed(
    plan: &Plan,
    paths: &Paths,
    compiler: &Compiler<'_>,
    outcome: &CompileOutcome,
) -> Result<(), Error> {
    if !outcome.compiled_any && paths.artifact.exists() {
        let artifact_mtime = system::get_modified_time(&paths.artifact)?;
        let mut inputs: Vec<PathBuf> = outcome
            .objects
            .iter()
            .map(|rel| paths.root.join(rel))
            .collect();
        // listed <obj> entries participate when they name an existing
        // file; -l flags carry no timestamp
        inputs.extend(
            plan.objects
                .iter()
                .filter(|o| !o.starts_with('-'))
                .map(|o| paths.root.join(o))
                .filter(|p| p.exists()),
        );
        let mut up_to_date = true;
        for input in &inputs {
            if system::get_modified_time(input)? >= artifact_mtime {
                up_to_date = false;
                break;
            }
        }
        if up_to_date {
            return Ok(());
        }
    }
    let tag = match plan.kind {
        ArtifactKind::Executable => "Linking",
        ArtifactKind::Library => "Archiving",
    };
    system::infoln!(tag, "{}", plan.artifact);
    compiler.link(&outcome.objects).run(&paths.root)
}

/// `-o SOURCE`: recompile exactly one source, no ops, no prebuilds, no
/// link.
fn compile_one(
    one: &str,
    plan: &Plan,
    paths: &Paths,
    compiler: &Compiler<'_>,
) -> Result<(), Error> {
    let source = plan
        .sources
        .iter()
        .find(|s| {
            s.rel
                .file_name()
                .map(|n| n.to_string_lossy() == one)
                .unwrap_or(false)
        })
        .ok_or_else(|| Error::NoSuchSource(one.to_string()))?;
    let o_path = paths.object(&source.rel);
    let d_path = paths.depfile(&source.rel);
    let source_abs = paths.root.join(&source.rel);
    if !depfile::is_stale(&paths.root, &source_abs, &o_path, &d_path)? {
        system::infoln!("Skipped", "{}", source.rel.display());
        return Ok(());
    }
    if let Some(parent) = o_path.parent() {
        system::ensure_directory(parent)?;
    }
    system::infoln!("Compiling", "{}", source.rel.display());
    compiler.compile(source).run(&paths.root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn clean_is_idempotent_and_scoped_to_the_output_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::write(root.join("keep.c"), "int main(){}").unwrap();
        let paths = Paths::new(root.clone(), "Release", "hello");
        fs::create_dir_all(paths.output.join("src")).unwrap();
        fs::write(paths.output.join("src/old.o"), "x").unwrap();

        clean(&paths).unwrap();
        assert!(paths.output.exists());
        assert_eq!(fs::read_dir(&paths.output).unwrap().count(), 0);
        assert!(root.join("keep.c").exists());

        // a second clean leaves the same empty tree
        clean(&paths).unwrap();
        assert!(paths.output.exists());
        assert_eq!(fs::read_dir(&paths.output).unwrap().count(), 0);
    }

    fn prebuild(path: &str) -> PrebuildRef {
        PrebuildRef {
            path: path.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn prebuild_inherits_the_parent_invocation() {
        let parent = Options {
            clean: true,
            prebuilds: true,
            file: "/proj/pyMake.xml".to_string(),
            config: "Release".to_string(),
            only: Some("main.c".to_string()),
            subs: vec!["target:w32".to_string()],
            dicts: vec![],
            dump: false,
        };
        let child = child_options(&parent, &prebuild("../Lib2"), Path::new("/proj"));
        assert_eq!(child.file, "/proj/../Lib2/pyMake.xml");
        assert_eq!(child.config, "Release");
        assert!(child.clean);
        assert!(child.prebuilds);
        assert_eq!(child.subs, ["target:w32"]);
        // single-file mode never propagates into prebuilds
        assert_eq!(child.only, None);
    }

    #[test]
    fn prebuild_overrides_replace_fields_and_append_subs() {
        let parent = Options {
            file: "custom.xml".to_string(),
            config: "Release".to_string(),
            subs: vec!["target:w32".to_string()],
            ..Default::default()
        };
        let pb = PrebuildRef {
            path: "../Lib2".to_string(),
            config_file: Some("other.xml".to_string()),
            configuration: Some("Release-test".to_string()),
            clean: Some(true),
            prebuilds: Some(false),
            subs: vec!["target:linux".to_string()],
        };
        let child = child_options(&parent, &pb, Path::new("/proj"));
        assert_eq!(child.file, "/proj/../Lib2/other.xml");
        assert_eq!(child.config, "Release-test");
        assert!(child.clean);
        assert!(!child.prebuilds);
        // appended entries seed later and therefore shadow the parent's
        assert_eq!(child.subs, ["target:w32", "target:linux"]);
    }
}
