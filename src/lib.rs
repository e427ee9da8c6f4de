use clap::Parser;

pub mod build;
pub mod system;

use crate::system::Error;

/// CLI entry point
#[derive(Debug, Clone, Default, PartialEq, Parser)]
#[command(name = "pymake", author, version, about, disable_version_flag = true)]
pub struct PyMake {
    /// Print version and exit
    #[clap(short = 'v')]
    pub version: bool,

    /// Build options
    #[clap(flatten)]
    pub options: Options,
}

#[derive(Debug, Clone, Default, PartialEq, Parser)]
pub struct Options {
    /// Remove the configuration's output tree before building
    #[clap(short = 'c')]
    pub clean: bool,

    /// Build `<prebuilds>` projects before this one
    #[clap(short = 'p')]
    pub prebuilds: bool,

    /// Project file
    #[clap(short = 'f', value_name = "FILE", default_value = "pyMake.xml")]
    pub file: String,

    /// Active configuration name
    #[clap(short = 'g', value_name = "CFG", default_value = "Release")]
    pub config: String,

    /// Compile only the source with this file name; skip linking
    #[clap(short = 'o', value_name = "SOURCE")]
    pub only: Option<String>,

    /// Add substitution entries (`key:value`; `;`-separated pairs accepted)
    #[clap(short = 's', value_name = "KEY:VAL")]
    pub subs: Vec<String>,

    /// Seed substitutions from a `<dicts>` XML file
    #[clap(short = 'i', value_name = "PATH")]
    pub dicts: Vec<String>,

    /// Dump the document after each evaluation phase
    #[clap(short = 'x')]
    pub dump: bool,
}

impl PyMake {
    /// Build the project
    pub fn run(&self) -> Result<(), Error> {
        if self.version {
            println!("pymake {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        build::run(&self.options, 0)
    }
}
