//! Generate and apply unified-diff patches against the sources inside a jar,
//! and turn a patched sources jar into an editable workspace.

pub mod apply;
pub mod archive;
pub mod create;
pub mod error;
pub mod line_diff;
pub mod line_patch;
pub mod manifest;
pub mod patch_format;
pub mod pipeline;
pub mod util;
pub mod workspace;

pub use error::{Error, Result};
