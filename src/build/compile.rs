//! Compile and link command composition
//!
//! Flag aggregation order is part of the observable contract: toolchain
//! flags, `-I` includes, project flags, configuration extras, per-file
//! flags, then optimization and debugging. Commands use project-relative
//! paths and run with the project directory as working directory, so
//! depfile prerequisites come out project-relative too.

use std::path::Path;

use itertools::Itertools;

use crate::build::paths::Paths;
use crate::build::plan::{ArtifactKind, Plan, Source, SourceKind};
use crate::system::{ChildBuilder, Error, PathExt};

/// One composed child invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn run(&self, cwd: &Path) -> Result<(), Error> {
        ChildBuilder::new(&self.program)
            .args(&self.args)
            .current_dir(cwd)
            .spawn()?
            .check()
    }
}

pub struct Compiler<'a> {
    plan: &'a Plan,
    paths: &'a Paths,
    c_flags: Vec<String>,
    cpp_flags: Vec<String>,
    s_flags: Vec<String>,
    l_flags: Vec<String>,
}

impl<'a> Compiler<'a> {
    pub fn new(plan: &'a Plan, paths: &'a Paths) -> Self {
        let tc = &plan.toolchain;
        let cfg = &plan.configuration;
        let includes = plan
            .includes
            .iter()
            .map(|path| format!("-I{path}"))
            .collect_vec();

        let language = |lang_tc: &[String], lang_project: &[String]| {
            tc.ccflags
                .iter()
                .chain(lang_tc)
                .chain(&includes)
                .chain(&plan.ccflags)
                .chain(lang_project)
                .chain(&cfg.ccflags)
                .cloned()
                .collect_vec()
        };
        let c_flags = language(&tc.cflags, &plan.cflags);
        let cpp_flags = language(&tc.cppflags, &plan.cppflags);
        let s_flags = language(&tc.aflags, &plan.aflags);
        let l_flags = tc
            .lflags
            .iter()
            .chain(&plan.lflags)
            .chain(&cfg.lflags)
            .cloned()
            .collect_vec();

        Self {
            plan,
            paths,
            c_flags,
            cpp_flags,
            s_flags,
            l_flags,
        }
    }

    /// Distinct compile drivers this plan will invoke, for the
    /// toolchain preflight check
    pub fn compile_drivers(&self) -> Vec<String> {
        let mut drivers = self
            .plan
            .sources
            .iter()
            .map(|s| match s.kind {
                SourceKind::Cpp => self.driver("g++"),
                SourceKind::C | SourceKind::Asm => self.driver("gcc"),
            })
            .collect_vec();
        drivers.sort();
        drivers.dedup();
        drivers
    }

    fn driver(&self, name: &str) -> String {
        format!("{}{}", self.plan.toolchain.ccprefix(), name)
    }

    fn from_root(&self, path: &Path) -> String {
        path.with_base(&self.paths.root).display().to_string()
    }

    pub fn compile(&self, source: &Source) -> Invocation {
        let (driver, base) = match source.kind {
            SourceKind::C => ("gcc", &self.c_flags),
            SourceKind::Cpp => ("g++", &self.cpp_flags),
            SourceKind::Asm => ("gcc", &self.s_flags),
        };
        let mut args = base.clone();
        args.extend(source.ccflags.iter().cloned());
        let optimization = source
            .optimization
            .clone()
            .unwrap_or_else(|| self.plan.configuration.optimization.clone());
        if !optimization.is_empty() {
            args.push(optimization);
        }
        let debugging = source
            .debugging
            .clone()
            .unwrap_or_else(|| self.plan.configuration.debugging.clone());
        if !debugging.is_empty() {
            args.push(debugging);
        }
        if source.rel.extension().is_some_and(|e| e == "S") {
            args.push("-x".to_string());
            args.push("assembler-with-cpp".to_string());
        }
        let object = self.from_root(&self.paths.object(&source.rel));
        let dep = self.from_root(&self.paths.depfile(&source.rel));
        args.push("-c".to_string());
        args.push(source.rel.display().to_string());
        args.push("-o".to_string());
        args.push(object);
        args.push("-MMD".to_string());
        args.push("-MP".to_string());
        args.push("-MF".to_string());
        args.push(dep);

        Invocation {
            program: self.driver(driver),
            args,
        }
    }

    /// Link (executable) or archive (library) command over the object
    /// set. Document `<obj>` entries are appended verbatim; order
    /// matters for static linking.
    pub fn link(&self, objects: &[String]) -> Invocation {
        let artifact = self.from_root(&self.paths.artifact);
        match self.plan.kind {
            ArtifactKind::Executable => {
                let args = self
                    .l_flags
                    .iter()
                    .chain(objects)
                    .chain(&self.plan.objects)
                    .cloned()
                    .chain(["-o".to_string(), artifact])
                    .collect_vec();
                Invocation {
                    program: self.driver("g++"),
                    args,
                }
            }
            ArtifactKind::Library => {
                let args = ["rcs".to_string(), artifact]
                    .into_iter()
                    .chain(objects.iter().cloned())
                    .chain(self.plan.objects.iter().cloned())
                    .collect_vec();
                Invocation {
                    program: self.driver("ar"),
                    args,
                }
            }
        }
    }
}
