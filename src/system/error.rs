//! Error types

use crate::system;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // usage
    #[error("invalid substitution `{0}`: expected `key:value`")]
    BadSubstitutionPair(String),

    // fs
    #[error("cannot find `{0}`")]
    NotFound(String),
    #[error("cannot read file `{0}`: {1}")]
    ReadFile(String, std::io::Error),
    #[error("cannot list directory `{0}`: {1}")]
    ListDirectory(String, std::io::Error),
    #[error("cannot create directory `{0}`: {1}")]
    CreateDirectory(String, std::io::Error),
    #[error("cannot remove directory `{0}`: {1}")]
    RemoveDirectory(String, std::io::Error),
    #[error("invalid path `{0}`: {1}")]
    InvalidPath(String, std::io::Error),

    // document
    #[error("cannot parse `{0}`: {1}")]
    ParseXml(String, String),
    #[error("`{0}`: expected root element `<{1}>`, found `<{2}>`")]
    BadRoot(String, String, String),
    #[error("`{0}`: `<dicts>` may only contain `<dict>` elements, found `<{1}>`")]
    BadDictRoot(String, String),
    #[error("`{0}`: an included file must have root `<{1}>`, found `<{2}>`")]
    BadIncludeRoot(String, String, String),
    #[error("`{0}` (line {1}): `<dict>` requires a `key` attribute")]
    MissingDictKey(String, u64),
    #[error("include cycle: `{0}` is already being included (chain: {1})")]
    IncludeCycle(String, String),

    // substitution
    #[error("`{0}`: unknown substitution key `{{{1}}}`")]
    UnknownKey(String, String),
    #[error("`{0}`: unbalanced braces in `{1}`")]
    UnbalancedBraces(String, String),

    // guards
    #[error("`{0}`: malformed `if` expression `{1}`: {2}")]
    IfSyntax(String, String, String),

    // plan
    #[error("`{0}`: missing `{1}` attribute on `<{2}>`")]
    MissingAttr(String, String, String),
    #[error("`{0}`: missing `<{1}>` element under `<{2}>`")]
    MissingElement(String, String, String),
    #[error("`{0}`: artifact type must be `executable` or `library`, found `{1}`")]
    BadArtifactType(String, String),
    #[error("`{0}`: no configuration named `{1}`")]
    UnknownConfiguration(String, String),
    #[error("`{0}`: no toolchain named `{1}`")]
    UnknownToolchain(String, String),
    #[error("`{0}`: unsupported source file `{1}`")]
    UnsupportedSource(String, String),
    #[error("`{0}`: source `{1}` escapes the project directory")]
    SourceOutsideProject(String, String),
    #[error("`{0}`: sources `{1}` and `{2}` produce the same object file")]
    DuplicateObject(String, String, String),
    #[error("`-o {0}` does not match any source")]
    NoSuchSource(String),
    #[error("`{0}`: executable `{1}` has no sources and no objects")]
    NothingToLink(String, String),
    #[error("`{0}`: object entry `{1}` is a linker flag; not allowed in an archive")]
    FlagInArchive(String, String),

    // process
    #[error("cannot find compiler `{0}`. Check the toolchain's compilerPath and compilerPrefix.")]
    MissingTool(String),
    #[error("error spawning `{0}`: {1}")]
    SpawnChild(String, std::io::Error),
    #[error("error waiting for `{0}`: {1}")]
    WaitForChild(String, std::io::Error),
    #[error("command exited with status {1}: {0}")]
    ChildFailure(String, i32),
}

impl Error {
    pub fn print(&self) {
        system::errorln!("Error", "{}", self);
    }

    /// Exit code for the process: a failing child's own status, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ChildFailure(_, code) => (*code).max(1),
            _ => 1,
        }
    }
}
