//! Build and infrastructure orchestration for serverless SSR stacks.
//!
//! A deployment runs in two phases:
//! - Phase 1 (`build`) runs the application build, injects the edge
//!   handler adapter into the server bundle and hashes both bundles.
//! - Phase 2 (`stack`) declares the edge function, origin bucket,
//!   distribution and asset deployment as a CloudFormation template.
//!
//! The synthesized assembly is handed to an external provisioning engine
//! (`provision`), and the distribution URL is derived from its outputs.
//! `Orchestrator` drives the whole sequence.

mod asset;
mod build;
mod config;
mod error;
mod lifecycle;
mod orchestrator;
mod provision;
pub mod resources;
mod routing;
mod stack;
mod template;

pub use asset::*;
pub use build::*;
pub use config::*;
pub use error::*;
pub use lifecycle::*;
pub use orchestrator::*;
pub use provision::*;
pub use routing::*;
pub use stack::*;
pub use template::*;
