//! Build output paths
//!
//! Everything the build generates lives under `<projectDir>/<config>`:
//! the artifact, plus one object file and one dependency file per
//! source, mirroring the source's project-relative path.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paths {
    /// Project directory (where the project XML lives), absolute
    pub root: PathBuf,

    /// Output directory for the active configuration (<root>/<config>)
    pub output: PathBuf,

    /// The final artifact (<output>/<artifactName>)
    pub artifact: PathBuf,
}

impl Paths {
    pub fn new(root: PathBuf, config: &str, artifact_name: &str) -> Self {
        let output = root.join(config);
        let artifact = output.join(artifact_name);
        Self {
            root,
            output,
            artifact,
        }
    }

    /// Object file for a project-relative source path
    /// (`src/hello.cpp` -> `<output>/src/hello.cpp.o`)
    pub fn object(&self, rel: &Path) -> PathBuf {
        self.derived(rel, ".o")
    }

    /// Dependency file beside the object
    /// (`src/hello.cpp` -> `<output>/src/hello.cpp.d`)
    pub fn depfile(&self, rel: &Path) -> PathBuf {
        self.derived(rel, ".d")
    }

    fn derived(&self, rel: &Path, suffix: &str) -> PathBuf {
        let mut path = self.output.join(rel).into_os_string();
        path.push(suffix);
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_mirror_the_source_tree() {
        let paths = Paths::new(PathBuf::from("/proj"), "Release", "hello");
        assert_eq!(paths.output, Path::new("/proj/Release"));
        assert_eq!(paths.artifact, Path::new("/proj/Release/hello"));
        assert_eq!(
            paths.object(Path::new("src/hello.cpp")),
            Path::new("/proj/Release/src/hello.cpp.o")
        );
        assert_eq!(
            paths.depfile(Path::new("src/hello.cpp")),
            Path::new("/proj/Release/src/hello.cpp.d")
        );
    }
}
