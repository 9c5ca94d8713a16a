//! Pipeline and walker configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default worker multiplier applied to the CPU count.
pub const DEFAULT_PARALLELISM: usize = 2;

/// Configuration for a hashing or verification run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct PipelineConfig {
    /// Follow symbolic links.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Recurse into directories via the walker.
    #[builder(default = "false")]
    #[serde(default)]
    pub recurse: bool,

    /// Do not cross filesystem boundaries while recursing.
    #[builder(default = "false")]
    #[serde(default)]
    pub one_filesystem: bool,

    /// Name patterns to exclude while recursing (glob syntax).
    #[builder(default)]
    #[serde(default)]
    pub excludes: Vec<String>,

    /// Workers per CPU.
    #[builder(default = "DEFAULT_PARALLELISM")]
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Worker count override (0 = CPU count times `parallelism`).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Work channel capacity (0 = one slot per worker).
    #[builder(default = "0")]
    #[serde(default)]
    pub channel_capacity: usize,
}

fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

impl PipelineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.parallelism == Some(0) {
            return Err("Parallelism must be at least 1".to_string());
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Create a new config builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Maximum number of workers for a run, given the number of CPUs.
    pub fn max_workers(&self, cpus: usize) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            cpus.max(1) * self.parallelism.max(1)
        }
    }

    /// Pool size for `inputs` known work items: never more workers than items.
    pub fn workers_for(&self, cpus: usize, inputs: usize) -> usize {
        self.max_workers(cpus).min(inputs).max(1)
    }

    /// Capacity of the work channel for a pool of `workers`.
    pub fn work_capacity(&self, workers: usize) -> usize {
        match self.channel_capacity {
            0 => workers.max(1),
            n => n,
        }
    }

    /// Walker options matching this config.
    pub fn walk_options(&self, roots: Vec<PathBuf>) -> WalkOptions {
        WalkOptions {
            roots,
            follow_symlinks: self.follow_symlinks,
            one_filesystem: self.one_filesystem,
            excludes: self.excludes.clone(),
            entry_filter: EntryFilter::FileOrSymlink,
            threads: 0,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            recurse: false,
            one_filesystem: false,
            excludes: Vec::new(),
            parallelism: DEFAULT_PARALLELISM,
            threads: 0,
            channel_capacity: 0,
        }
    }
}

/// Entry types the walker yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EntryFilter {
    /// Regular files only.
    #[default]
    File,
    /// Symlinks only.
    Symlink,
    /// Regular files plus symlinks that do not lead to a directory.
    FileOrSymlink,
    /// Everything except directories.
    Any,
}

/// Options for the recursive walker.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct WalkOptions {
    /// Roots to walk, in order.
    pub roots: Vec<PathBuf>,

    /// Descend through symlinked directories.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Stay on each root's filesystem.
    #[builder(default = "false")]
    #[serde(default)]
    pub one_filesystem: bool,

    /// Name patterns to exclude (glob syntax).
    #[builder(default)]
    #[serde(default)]
    pub excludes: Vec<String>,

    /// Which entry types to yield.
    #[builder(default)]
    #[serde(default)]
    pub entry_filter: EntryFilter,

    /// Number of threads for directory reads (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,
}

impl WalkOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.roots {
            Some(ref roots) if roots.is_empty() => Err("At least one root is required".to_string()),
            Some(ref roots) if roots.iter().any(|r| r.as_os_str().is_empty()) => {
                Err("Root path cannot be empty".to_string())
            }
            Some(_) => Ok(()),
            None => Err("Roots are required".to_string()),
        }
    }
}

impl WalkOptions {
    /// Create a new options builder.
    pub fn builder() -> WalkOptionsBuilder {
        WalkOptionsBuilder::default()
    }
}
