// ABOUTME: Provisioning run state marker types for the type state pattern.
// ABOUTME: States carry what the next transition needs, so skipped steps fail to compile.

use std::path::PathBuf;

use crate::render::RenderedCluster;

/// Compiled configuration, nothing rendered yet.
/// Available actions: `render()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Compiled;

/// Every template and userdata asset rendered and locally validated.
/// Available actions: `validate()`, `diff()`, `estimate_cost()`, `export()`, `stage()`
#[derive(Debug, Clone)]
pub struct Rendered {
    pub(crate) cluster: RenderedCluster,
}

/// Assets uploaded to the object store.
/// Available actions: `create()`, `update()`, `apply()`
#[derive(Debug, Clone)]
pub struct Staged {
    pub(crate) cluster: RenderedCluster,
}

/// Assets written to a local directory instead of being deployed.
#[derive(Debug, Clone)]
pub struct Exported {
    pub(crate) dir: PathBuf,
    pub(crate) files: Vec<PathBuf>,
}
