//! Resource declarations composing the stack.
//!
//! Declarations are pure: they turn configuration and hashed assets into
//! template resources and never touch the filesystem.

mod bucket;
mod deployment;
mod distribution;
mod function;
mod origin;
mod output;

pub use bucket::*;
pub use deployment::*;
pub use distribution::*;
pub use function::*;
pub use origin::*;
pub use output::*;

use crate::template::Resource;

/// Something that contributes resources to the template.
pub trait Declaration {
    /// Resources keyed by logical id.
    fn resources(&self) -> Vec<(String, Resource)>;
}
