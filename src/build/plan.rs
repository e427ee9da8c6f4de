//! Resolved build plan
//!
//! Phase three selects the active configuration and its toolchain and
//! synthesizes `{ccprefix}`; phase four flattens the evaluated document
//! into the flag lists, source set and action lists the composer and
//! executor consume. Lists keep document order throughout.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::build::dict::SubstMap;
use crate::build::document::Element;
use crate::build::guard;
use crate::system::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Executable,
    Library,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    C,
    Cpp,
    Asm,
}

impl SourceKind {
    pub fn from_ext(ext: &str) -> Option<Self> {
        match ext {
            "c" => Some(Self::C),
            "cpp" | "cc" | "cxx" => Some(Self::Cpp),
            "s" | "S" => Some(Self::Asm),
            _ => None,
        }
    }

    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::from_ext(ext)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Toolchain {
    pub name: String,
    pub compiler_path: String,
    pub compiler_prefix: String,
    pub ccflags: Vec<String>,
    pub cflags: Vec<String>,
    pub cppflags: Vec<String>,
    pub aflags: Vec<String>,
    pub lflags: Vec<String>,
}

impl Toolchain {
    /// The toolchain's full executable prefix. `{ccprefix}` resolves to
    /// this once the toolchain is selected.
    pub fn ccprefix(&self) -> String {
        format!("{}/{}", self.compiler_path, self.compiler_prefix)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    pub name: String,
    pub toolchain: String,
    /// Verbatim optimization flag (for example `-O2`), empty for none
    pub optimization: String,
    /// Verbatim debugging flag (for example `-g`), empty for none
    pub debugging: String,
    pub ccflags: Vec<String>,
    pub lflags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    /// Path relative to the project directory, as listed or expanded
    pub rel: PathBuf,
    pub kind: SourceKind,
    pub ccflags: Vec<String>,
    pub optimization: Option<String>,
    pub debugging: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrebuildRef {
    pub path: String,
    pub config_file: Option<String>,
    pub configuration: Option<String>,
    pub clean: Option<bool>,
    pub prebuilds: Option<bool>,
    pub subs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// File name of the final artifact inside the output directory
    pub artifact: String,
    pub kind: ArtifactKind,
    pub toolchain: Toolchain,
    pub configuration: Configuration,
    pub ccflags: Vec<String>,
    pub cflags: Vec<String>,
    pub cppflags: Vec<String>,
    pub aflags: Vec<String>,
    pub lflags: Vec<String>,
    pub includes: Vec<String>,
    /// `<obj>` entries, appended verbatim at link time
    pub objects: Vec<String>,
    pub pre_ops: Vec<String>,
    pub post_ops: Vec<String>,
    pub prebuilds: Vec<PrebuildRef>,
    pub sources: Vec<Source>,
}

/// Phases three and four: select the toolchain and configuration, then
/// flatten the evaluated document into a `Plan`.
pub fn assemble(
    doc: &Element,
    origin: &str,
    root_dir: &Path,
    map: &mut SubstMap,
    active: &str,
) -> Result<Plan, Error> {
    if doc.name != "project" {
        return Err(Error::BadRoot(
            origin.to_string(),
            "project".to_string(),
            doc.name.clone(),
        ));
    }
    let artifact_base = doc
        .attr("artifact")
        .ok_or_else(|| missing_attr(origin, "artifact", "project"))?
        .to_string();
    let kind = match doc.attr("type") {
        Some("executable") => ArtifactKind::Executable,
        Some("library") => ArtifactKind::Library,
        Some(other) => {
            return Err(Error::BadArtifactType(origin.to_string(), other.to_string()))
        }
        None => return Err(missing_attr(origin, "type", "project")),
    };

    let configuration = parse_configuration(doc, origin, active)?;
    let toolchain = parse_toolchain(doc, origin, &configuration.toolchain)?;
    map.seed("ccprefix", &toolchain.ccprefix());

    // op text was deferred past the substitution pass; {ccprefix} is
    // available now
    let pre_ops = substitute_ops(doc, "pre_op", origin, map)?;
    let post_ops = substitute_ops(doc, "post_op", origin, map)?;

    let extension = doc
        .children_named("extension")
        .last()
        .map(|e| e.text.clone())
        .filter(|t| !t.is_empty());
    let artifact = artifact_name(&artifact_base, kind, extension.as_deref());

    let includes = doc
        .children_named("includes")
        .flat_map(|block| block.texts("path"))
        .collect();
    let objects: Vec<String> = doc
        .children_named("objects")
        .flat_map(|block| block.texts("obj"))
        .collect();
    if kind == ArtifactKind::Library {
        if let Some(flag) = objects.iter().find(|o| o.starts_with('-')) {
            return Err(Error::FlagInArchive(origin.to_string(), flag.clone()));
        }
    }

    let prebuilds = parse_prebuilds(doc, origin)?;
    let sources = expand_sources(doc, origin, root_dir)?;

    if kind == ArtifactKind::Executable && sources.is_empty() && objects.is_empty() {
        return Err(Error::NothingToLink(origin.to_string(), artifact));
    }

    Ok(Plan {
        artifact,
        kind,
        toolchain,
        configuration,
        ccflags: doc.texts("ccflag"),
        cflags: doc.texts("cflag"),
        cppflags: doc.texts("cppflag"),
        aflags: doc.texts("aflag"),
        lflags: doc.texts("lflag"),
        includes,
        objects,
        pre_ops,
        post_ops,
        prebuilds,
        sources,
    })
}

fn missing_attr(origin: &str, attr: &str, element: &str) -> Error {
    Error::MissingAttr(origin.to_string(), attr.to_string(), element.to_string())
}

fn artifact_name(base: &str, kind: ArtifactKind, extension: Option<&str>) -> String {
    match kind {
        ArtifactKind::Executable => match extension {
            Some(ext) => format!("{base}.{ext}"),
            None => base.to_string(),
        },
        ArtifactKind::Library => format!("lib{base}.{}", extension.unwrap_or("a")),
    }
}

fn parse_configuration(doc: &Element, origin: &str, active: &str) -> Result<Configuration, Error> {
    let element = doc
        .children_named("configuration")
        .find(|c| c.attr("name") == Some(active))
        .ok_or_else(|| Error::UnknownConfiguration(origin.to_string(), active.to_string()))?;
    let toolchain = element
        .child_text("toolchain")
        .ok_or_else(|| {
            Error::MissingElement(
                origin.to_string(),
                "toolchain".to_string(),
                "configuration".to_string(),
            )
        })?
        .to_string();
    Ok(Configuration {
        name: active.to_string(),
        toolchain,
        optimization: element.child_text("optimization").unwrap_or("").to_string(),
        debugging: element.child_text("debugging").unwrap_or("").to_string(),
        ccflags: element.texts("ccflag"),
        lflags: element.texts("lflag"),
    })
}

fn parse_toolchain(doc: &Element, origin: &str, name: &str) -> Result<Toolchain, Error> {
    let element = doc
        .children_named("toolchain")
        .find(|c| c.attr("name") == Some(name))
        .ok_or_else(|| Error::UnknownToolchain(origin.to_string(), name.to_string()))?;
    Ok(Toolchain {
        name: name.to_string(),
        compiler_path: element.child_text("compilerPath").unwrap_or("").to_string(),
        compiler_prefix: element.child_text("compilerPrefix").unwrap_or("").to_string(),
        ccflags: element.texts("ccflag"),
        cflags: element.texts("cflag"),
        cppflags: element.texts("cppflag"),
        aflags: element.texts("aflag"),
        lflags: element.texts("lflag"),
    })
}

fn substitute_ops(
    doc: &Element,
    name: &str,
    origin: &str,
    map: &SubstMap,
) -> Result<Vec<String>, Error> {
    let mut ops = Vec::new();
    for element in doc.children_named(name) {
        let at = format!("{} (line {})", origin, element.line);
        let text = map.substitute(&element.text, &at)?;
        if !text.is_empty() {
            ops.push(text);
        }
    }
    Ok(ops)
}

fn parse_prebuilds(doc: &Element, origin: &str) -> Result<Vec<PrebuildRef>, Error> {
    let mut prebuilds = Vec::new();
    for block in doc.children_named("prebuilds") {
        for project in block.children_named("project") {
            let path = project
                .attr("path")
                .ok_or_else(|| missing_attr(origin, "path", "project"))?
                .to_string();
            prebuilds.push(PrebuildRef {
                path,
                config_file: project.child_text("configfile").map(str::to_string),
                configuration: project.child_text("configuration").map(str::to_string),
                clean: project.child_text("clean").map(guard::truthy),
                prebuilds: project.child_text("prebuilds").map(guard::truthy),
                subs: project.texts("sub"),
            });
        }
    }
    Ok(prebuilds)
}

fn expand_sources(doc: &Element, origin: &str, root_dir: &Path) -> Result<Vec<Source>, Error> {
    let mut sources = Vec::new();
    // object path -> source path, for duplicate detection
    let mut claimed: BTreeMap<String, String> = BTreeMap::new();

    for block in doc.children_named("sources") {
        for file in block.children_named("file") {
            let at = format!("{} (line {})", origin, file.line);
            let path = file
                .attr("path")
                .ok_or_else(|| missing_attr(origin, "path", "file"))?;
            let excludes = file.texts("exclude");
            let ccflags = file.texts("ccflag");
            let optimization = file
                .child_text("optimization")
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            let debugging = file
                .child_text("debugging")
                .filter(|t| !t.is_empty())
                .map(str::to_string);

            for rel in expand_entry(path, &excludes, root_dir, &at)? {
                let kind = SourceKind::of(&rel).ok_or_else(|| {
                    Error::UnsupportedSource(at.clone(), rel.display().to_string())
                })?;
                let rel_str = rel.display().to_string();
                let object = format!("{rel_str}.o");
                if let Some(first) = claimed.get(&object) {
                    return Err(Error::DuplicateObject(
                        origin.to_string(),
                        first.clone(),
                        rel_str,
                    ));
                }
                claimed.insert(object, rel_str);
                sources.push(Source {
                    rel,
                    kind,
                    ccflags: ccflags.clone(),
                    optimization: optimization.clone(),
                    debugging: debugging.clone(),
                });
            }
        }
    }
    Ok(sources)
}

/// Expand one `<file>` entry. A trailing `/*` lists the directory
/// shallowly, keeps supported source kinds and subtracts excludes;
/// anything else names a single source file.
fn expand_entry(
    path: &str,
    excludes: &[String],
    root_dir: &Path,
    at: &str,
) -> Result<Vec<PathBuf>, Error> {
    let dir_rel = match path.strip_suffix("/*") {
        Some(d) => d,
        None if path == "*" => "",
        None => {
            check_inside_project(path, at)?;
            return Ok(vec![normalize_rel(path)]);
        }
    };
    check_inside_project(dir_rel, at)?;

    let dir = root_dir.join(dir_rel);
    let mut matched = Vec::new();
    for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry =
            entry.map_err(|e| Error::ListDirectory(dir.display().to_string(), e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if SourceKind::of(entry.path()).is_none() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = normalize_rel(dir_rel).join(&name);
        let rel_str = rel.display().to_string();
        if excludes.iter().any(|x| *x == name || *x == rel_str) {
            continue;
        }
        matched.push(rel);
    }
    Ok(matched)
}

/// Object files mirror source-relative paths under the output tree, so
/// a source must stay inside the project directory.
fn check_inside_project(rel: &str, at: &str) -> Result<(), Error> {
    let path = Path::new(rel);
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
    if escapes {
        return Err(Error::SourceOutsideProject(at.to_string(), rel.to_string()));
    }
    Ok(())
}

fn normalize_rel(rel: &str) -> PathBuf {
    Path::new(rel)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::document;
    use std::fs;

    fn assemble_str(xml: &str, root_dir: &Path, active: &str) -> Result<Plan, Error> {
        let doc = document::parse(xml, "test").unwrap();
        let mut map = SubstMap::new();
        map.seed("config", active);
        assemble(&doc, "test", root_dir, &mut map, active)
    }

    const MINIMAL: &str = r#"<project artifact="hello" type="executable">
        <toolchain name="x86">
            <compilerPath>/usr/bin</compilerPath>
            <compilerPrefix></compilerPrefix>
        </toolchain>
        <configuration name="Release">
            <toolchain>x86</toolchain>
            <optimization>-O2</optimization>
        </configuration>
        <sources><file path="src/hello.cpp"/></sources>
    </project>"#;

    #[test]
    fn selects_toolchain_through_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let plan = assemble_str(MINIMAL, dir.path(), "Release").unwrap();
        assert_eq!(plan.artifact, "hello");
        assert_eq!(plan.toolchain.ccprefix(), "/usr/bin/");
        assert_eq!(plan.configuration.optimization, "-O2");
        assert_eq!(plan.sources.len(), 1);
        assert_eq!(plan.sources[0].rel, Path::new("src/hello.cpp"));
        assert_eq!(plan.sources[0].kind, SourceKind::Cpp);
    }

    #[test]
    fn unknown_configuration_and_toolchain_fail() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            assemble_str(MINIMAL, dir.path(), "Debug"),
            Err(Error::UnknownConfiguration(_, name)) if name == "Debug"
        ));
        let bad = MINIMAL.replace("<toolchain>x86</toolchain>", "<toolchain>arm</toolchain>");
        assert!(matches!(
            assemble_str(&bad, dir.path(), "Release"),
            Err(Error::UnknownToolchain(_, name)) if name == "arm"
        ));
    }

    #[test]
    fn ccprefix_reaches_op_text() {
        let dir = tempfile::tempdir().unwrap();
        let xml = MINIMAL.replace(
            "<sources>",
            "<post_op>{ccprefix}objcopy -O binary a b</post_op><sources>",
        );
        let plan = assemble_str(&xml, dir.path(), "Release").unwrap();
        assert_eq!(plan.post_ops, ["/usr/bin/objcopy -O binary a b"]);
    }

    #[test]
    fn artifact_naming() {
        assert_eq!(
            artifact_name("hello", ArtifactKind::Executable, None),
            "hello"
        );
        assert_eq!(
            artifact_name("hello", ArtifactKind::Executable, Some("exe")),
            "hello.exe"
        );
        assert_eq!(artifact_name("two", ArtifactKind::Library, None), "libtwo.a");
        assert_eq!(
            artifact_name("two", ArtifactKind::Library, Some("lib")),
            "libtwo.lib"
        );
    }

    #[test]
    fn last_extension_wins() {
        let dir = tempfile::tempdir().unwrap();
        let xml = MINIMAL.replace(
            "<sources>",
            "<extension>bin</extension><extension>exe</extension><sources>",
        );
        let plan = assemble_str(&xml, dir.path(), "Release").unwrap();
        assert_eq!(plan.artifact, "hello.exe");
    }

    #[test]
    fn wildcard_expansion_is_shallow_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        for name in ["main.c", "util.cpp", "boot.S", "notes.txt", "skip.c"] {
            fs::write(dir.path().join("src").join(name), "").unwrap();
        }
        fs::write(dir.path().join("src/nested/deep.c"), "").unwrap();
        let xml = MINIMAL.replace(
            r#"<file path="src/hello.cpp"/>"#,
            r#"<file path="src/*"><exclude>skip.c</exclude></file>"#,
        );
        let plan = assemble_str(&xml, dir.path(), "Release").unwrap();
        let rels: Vec<String> = plan
            .sources
            .iter()
            .map(|s| s.rel.display().to_string())
            .collect();
        assert_eq!(rels, ["src/boot.S", "src/main.c", "src/util.cpp"]);
        assert_eq!(plan.sources[0].kind, SourceKind::Asm);
    }

    #[test]
    fn wildcard_matching_nothing_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        let xml = MINIMAL
            .replace(r#"<file path="src/hello.cpp"/>"#, r#"<file path="src/*"/>"#)
            .replace("type=\"executable\"", "type=\"library\"");
        let plan = assemble_str(&xml, dir.path(), "Release").unwrap();
        assert!(plan.sources.is_empty());
    }

    #[test]
    fn wildcard_over_a_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let xml = MINIMAL.replace(
            r#"<file path="src/hello.cpp"/>"#,
            r#"<file path="missing/*"/>"#,
        );
        assert!(matches!(
            assemble_str(&xml, dir.path(), "Release"),
            Err(Error::ListDirectory(..))
        ));
    }

    #[test]
    fn duplicate_objects_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let xml = MINIMAL.replace(
            r#"<file path="src/hello.cpp"/>"#,
            r#"<file path="src/hello.cpp"/><file path="./src/hello.cpp"/>"#,
        );
        assert!(matches!(
            assemble_str(&xml, dir.path(), "Release"),
            Err(Error::DuplicateObject(..))
        ));
    }

    #[test]
    fn sources_must_stay_inside_the_project() {
        let dir = tempfile::tempdir().unwrap();
        let xml = MINIMAL.replace(
            r#"<file path="src/hello.cpp"/>"#,
            r#"<file path="../shared/hello.cpp"/>"#,
        );
        assert!(matches!(
            assemble_str(&xml, dir.path(), "Release"),
            Err(Error::SourceOutsideProject(..))
        ));
    }

    #[test]
    fn executable_with_no_inputs_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let xml = MINIMAL.replace(r#"<sources><file path="src/hello.cpp"/></sources>"#, "");
        assert!(matches!(
            assemble_str(&xml, dir.path(), "Release"),
            Err(Error::NothingToLink(..))
        ));
    }

    #[test]
    fn library_may_have_no_sources_but_no_flag_objects() {
        let dir = tempfile::tempdir().unwrap();
        let xml = MINIMAL
            .replace("type=\"executable\"", "type=\"library\"")
            .replace(r#"<sources><file path="src/hello.cpp"/></sources>"#, "");
        let plan = assemble_str(&xml, dir.path(), "Release").unwrap();
        assert!(plan.sources.is_empty());

        let xml = xml.replace(
            "<configuration",
            "<objects><obj>-lfoo</obj></objects><configuration",
        );
        assert!(matches!(
            assemble_str(&xml, dir.path(), "Release"),
            Err(Error::FlagInArchive(..))
        ));
    }

    #[test]
    fn prebuild_overrides_are_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let xml = MINIMAL.replace(
            "<sources>",
            r#"<prebuilds>
                <project path="../Lib2">
                    <configuration>Release-test</configuration>
                    <clean>1</clean>
                    <prebuilds>0</prebuilds>
                    <sub>target:w32</sub>
                </project>
            </prebuilds><sources>"#,
        );
        let plan = assemble_str(&xml, dir.path(), "Release").unwrap();
        assert_eq!(plan.prebuilds.len(), 1);
        let pb = &plan.prebuilds[0];
        assert_eq!(pb.path, "../Lib2");
        assert_eq!(pb.configuration.as_deref(), Some("Release-test"));
        assert_eq!(pb.clean, Some(true));
        assert_eq!(pb.prebuilds, Some(false));
        assert_eq!(pb.subs, ["target:w32"]);
        assert_eq!(pb.config_file, None);
    }

    #[test]
    fn flag_lists_keep_document_order() {
        let dir = tempfile::tempdir().unwrap();
        let xml = MINIMAL.replace(
            "<toolchain name=",
            r#"<ccflag>-Wall</ccflag><cflag>-std=c11</cflag><ccflag>-Werror</ccflag><toolchain name="#,
        );
        let plan = assemble_str(&xml, dir.path(), "Release").unwrap();
        assert_eq!(plan.ccflags, ["-Wall", "-Werror"]);
        assert_eq!(plan.cflags, ["-std=c11"]);
    }
}
