//! Build glue: named targets mapped to fixed operation sequences.
//!
//! This replaces the historical makefile. Each [`Target`] owns an ordered
//! list of [`Operation`]s which run synchronously, in order, halting at the
//! first failure. There is no dependency graph and no parallelism; the
//! filesystem is treated as exclusively owned while a target runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::{debug, info};

use crate::error::{AmidevError, Result};

/// A named, invokable unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Target {
    All,
    Clean,
    Install,
}

impl Target {
    /// The fixed operation sequence for this target, in execution order
    pub fn operations(&self) -> Vec<Operation> {
        match self {
            // `all` has no side effects; the runner prints the target
            // listing instead.
            Target::All => vec![],
            Target::Clean => vec![
                Operation::remove_tree("build"),
                Operation::remove_tree("dist"),
                Operation::remove_matching("**/*.uaem"),
            ],
            Target::Install => vec![Operation::invoke("cargo", ["install", "--path", "."])],
        }
    }
}

/// A single side-effecting action within a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Recursively delete everything matching a glob pattern
    RemoveMatching(String),
    /// Delete a directory tree (or single file) by path
    RemoveTree(PathBuf),
    /// Run an external command and require a zero exit status
    Invoke { program: String, args: Vec<String> },
}

impl Operation {
    pub fn remove_matching(pattern: impl Into<String>) -> Self {
        Self::RemoveMatching(pattern.into())
    }

    pub fn remove_tree(path: impl Into<PathBuf>) -> Self {
        Self::RemoveTree(path.into())
    }

    pub fn invoke<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Invoke {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Human-readable form used in logs and error messages
    pub fn describe(&self) -> String {
        match self {
            Self::RemoveMatching(pattern) => format!("remove matching {}", pattern),
            Self::RemoveTree(path) => format!("remove tree {}", path.display()),
            Self::Invoke { program, args } => {
                let mut s = program.clone();
                for arg in args {
                    s.push(' ');
                    s.push_str(arg);
                }
                s
            }
        }
    }

    /// Execute this operation with `root` as the working directory.
    ///
    /// Deleting something that does not exist is not a failure; that is
    /// what keeps `clean` idempotent.
    pub fn execute(&self, root: &Path) -> Result<()> {
        debug!("executing operation: {}", self.describe());
        match self {
            Self::RemoveMatching(pattern) => self.remove_matching_in(root, pattern),
            Self::RemoveTree(path) => self.remove_path(&root.join(path)),
            Self::Invoke { program, args } => {
                let status = Command::new(program)
                    .args(args)
                    .current_dir(root)
                    .status()
                    .map_err(|e| AmidevError::operation(self.describe(), e.to_string()))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(AmidevError::command_failed(self.describe(), status))
                }
            }
        }
    }

    fn remove_matching_in(&self, root: &Path, pattern: &str) -> Result<()> {
        let full = root.join(pattern);
        let full = full.to_string_lossy();
        let paths = glob::glob(&full)
            .map_err(|e| AmidevError::operation(self.describe(), e.to_string()))?;
        for entry in paths {
            let path = entry.map_err(|e| AmidevError::operation(self.describe(), e.to_string()))?;
            self.remove_path(&path)?;
        }
        Ok(())
    }

    fn remove_path(&self, path: &Path) -> Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(AmidevError::operation(self.describe(), e.to_string())),
        };
        let removed = if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match removed {
            Ok(()) => {
                debug!("removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AmidevError::operation(self.describe(), e.to_string())),
        }
    }
}

/// Execute a sequence of operations in order, halting at the first failure.
///
/// Operations after a failed one are skipped; there is no recovery and no
/// retry.
pub fn run_operations(operations: &[Operation], root: &Path) -> Result<()> {
    for op in operations {
        op.execute(root)?;
    }
    Ok(())
}

/// Run a target by name with `root` as the working directory.
///
/// An unknown target name fails with [`AmidevError::UnknownTarget`] before
/// any operation runs.
pub fn run_target(name: &str, root: &Path) -> Result<()> {
    let target =
        Target::from_str(name).map_err(|_| AmidevError::UnknownTarget(name.to_string()))?;
    info!("running target `{}`", target);

    if target == Target::All {
        println!("Available targets:");
        for t in Target::iter() {
            println!("  {}", t);
        }
        return Ok(());
    }

    run_operations(&target.operations(), root)
}
