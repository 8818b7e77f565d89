//! Declarative workspace setup: for every configured target, apply the patch
//! tree to the decompiled sources jar and extract the result into a workspace.
//!
//! ```toml
//! patch_root = "patches/1.16.4"
//! jars_dir = ".cache/jars"
//! workspace_root = "workspace/1.16.4"
//!
//! [[target]]
//! name = "server"
//! sources_jar = ".cache/jars/server-remapped-1.16.4-sources-base.jar"
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::apply::{self, ApplySummary};
use crate::error::{Error, Result};
use crate::util;
use crate::workspace;

const STAMP_SUFFIX: &str = ".stamp";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "default_patch_root")]
    pub patch_root: PathBuf,
    #[serde(default = "default_jars_dir")]
    pub jars_dir: PathBuf,
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    #[serde(rename = "target", default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub name: String,
    pub sources_jar: PathBuf,
    pub patches: Option<PathBuf>,
    pub output_jar: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
}

fn default_patch_root() -> PathBuf {
    PathBuf::from("patches")
}

fn default_jars_dir() -> PathBuf {
    PathBuf::from("jars")
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("workspace")
}

/// Fully resolved paths for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPlan {
    pub name: String,
    pub sources_jar: PathBuf,
    pub patches: PathBuf,
    pub output_jar: PathBuf,
    pub workspace: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub name: String,
    /// `None` when the patched jar was already up to date.
    pub applied: Option<ApplySummary>,
    pub files_extracted: usize,
}

impl PipelineConfig {
    /// Load a config file. Relative paths inside it are resolved against the
    /// directory containing the file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config: PipelineConfig = toml::from_str(&text).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.resolve_against(base);
        Ok(config)
    }

    fn resolve_against(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.patch_root);
        resolve(&mut self.jars_dir);
        resolve(&mut self.workspace_root);
        for target in &mut self.targets {
            resolve(&mut target.sources_jar);
            target.patches.iter_mut().for_each(resolve);
            target.output_jar.iter_mut().for_each(resolve);
            target.workspace.iter_mut().for_each(resolve);
        }
    }

    /// Plans for the targets named in `only`, or for all targets when `only` is
    /// empty. Unknown names, duplicate names and colliding outputs are errors.
    pub fn plans(&self, source: &Path, only: &[String]) -> Result<Vec<TargetPlan>> {
        let config_error = |reason: String| Error::Config {
            path: source.to_path_buf(),
            reason,
        };

        let mut names = HashSet::new();
        for target in &self.targets {
            if !names.insert(target.name.as_str()) {
                return Err(config_error(format!("duplicate target name {:?}", target.name)));
            }
        }
        for name in only {
            if !names.contains(name.as_str()) {
                return Err(config_error(format!("no target named {name:?}")));
            }
        }

        let plans: Vec<TargetPlan> = self
            .targets
            .iter()
            .filter(|t| only.is_empty() || only.contains(&t.name))
            .map(|t| self.plan(t))
            .collect();

        let mut outputs = HashSet::new();
        for plan in &plans {
            if !outputs.insert(&plan.output_jar) || !outputs.insert(&plan.workspace) {
                return Err(config_error(format!(
                    "target {:?} shares an output path with another target",
                    plan.name
                )));
            }
        }
        Ok(plans)
    }

    fn plan(&self, target: &TargetConfig) -> TargetPlan {
        TargetPlan {
            name: target.name.clone(),
            sources_jar: target.sources_jar.clone(),
            patches: target
                .patches
                .clone()
                .unwrap_or_else(|| self.patch_root.join(&target.name)),
            output_jar: target
                .output_jar
                .clone()
                .unwrap_or_else(|| self.jars_dir.join(format!("{}-sources-patched.jar", target.name))),
            workspace: target
                .workspace
                .clone()
                .unwrap_or_else(|| self.workspace_root.join(&target.name)),
        }
    }
}

/// Apply patches (unless the stamp says the output is current) and rebuild the
/// workspace for one target.
pub fn run_target(plan: &TargetPlan) -> Result<TargetReport> {
    if !plan.sources_jar.is_file() {
        return Err(Error::NotFound(plan.sources_jar.display().to_string()));
    }
    let patches = plan.patches.is_dir().then_some(plan.patches.as_path());
    if patches.is_none() {
        tracing::info!(name = %plan.name, patches = %plan.patches.display(), "no patch directory, output is an unpatched copy");
    }

    let digest = input_digest(&plan.sources_jar, patches)?;
    let stamp = stamp_path(&plan.output_jar);

    let applied = if is_up_to_date(&plan.output_jar, &stamp, &digest) {
        tracing::info!(name = %plan.name, "patched jar is up to date");
        None
    } else {
        remove_if_exists(&stamp)?;
        let summary = apply::apply_patches(&plan.sources_jar, patches, &plan.output_jar)?;
        std::fs::write(&stamp, format!("{digest}\n")).map_err(|e| Error::io(&stamp, e))?;
        Some(summary)
    };

    let files_extracted = workspace::create_workspace(&plan.output_jar, &plan.workspace)?;

    Ok(TargetReport {
        name: plan.name.clone(),
        applied,
        files_extracted,
    })
}

/// `<output>.stamp`
pub fn stamp_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(STAMP_SUFFIX);
    PathBuf::from(name)
}

/// BLAKE3 over the baseline jar and every file of the patch tree. Each patch
/// contributes its relative name and length ahead of its bytes so moving or
/// splitting content changes the digest.
pub fn input_digest(sources_jar: &Path, patches: Option<&Path>) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
    hasher.update(&[0]);
    util::hash_file_into(&mut hasher, sources_jar)?;

    if let Some(root) = patches {
        for file in util::walk_files(root)? {
            hasher.update(&[0]);
            hasher.update(file.relative_path.as_bytes());
            hasher.update(&[0]);
            hasher.update(&file.size.to_le_bytes());
            util::hash_file_into(&mut hasher, &file.full_path)?;
        }
    }

    Ok(hasher.finalize().to_hex().to_string())
}

fn is_up_to_date(output: &Path, stamp: &Path, digest: &str) -> bool {
    if !output.is_file() {
        return false;
    }
    match std::fs::read_to_string(stamp) {
        Ok(recorded) => recorded.trim() == digest,
        Err(_) => false,
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}
