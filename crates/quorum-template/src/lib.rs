//! # Quorum Template
//!
//! Renders the per-member runtime template from desired state and decides
//! whether a difference against the running template is worth a rolling
//! restart right now.
//!
//! ## Field classes
//!
//! | Class | Fields | Applied |
//! |---|---|---|
//! | Critical | image, resources, service identity, execution units | always |
//! | Non-critical | environment entries, mounted configuration | only when every member is healthy |
//!
//! Environment and mounted configuration use subset semantics: entries
//! added to the running template by other controllers are ignored and
//! carried over into the applied template.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod classifier;
pub mod env;
pub mod error;
pub mod render;
pub mod resources;

pub use classifier::{Classification, FormationSnapshot, TemplateClassifier, TemplateField};
pub use env::{env_differences, env_subset_equal, merge_env};
pub use error::{TemplateError, TemplateResult};
pub use render::{RenderConfig, TemplateRenderer};
pub use resources::{resource_differences, resources_equal};
