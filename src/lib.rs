//! Resolves the build model of a Lagoon environment and retires the Kubernetes resources that the
//! model no longer declares.
//!
//! A build starts from a docker-compose file, the project's `.lagoon.yml`, the project and
//! environment variables from the Lagoon API, and the environment of the build pod. The
//! `generator` turns those into a `BuildValues`, which the templating functions render into
//! Kubernetes objects. After that, the `collector` takes a snapshot of what exists in the
//! namespace, `identify` works out what has been abandoned, and `cleanup` removes it.
//!
//! ```no_run
//! use lagoon_build::prelude::*;
//! use std::path::Path;
//!
//! // reads .lagoon.yml and the compose file from the current directory and the rest of the
//! // configuration from the environment, then reports what would be removed
//! let report = run_from_environment(Path::new("."), false).expect("build failed");
//! println!("would remove deployments: {:?}", report.deployments);
//! ```
//!
//! Tests substitute the cluster and the DBaaS operator with the fakes in `runner::testkit`
//! (behind the `testkit` feature).

#[macro_use]
extern crate serde_derive;

pub mod cleanup;
pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod generator;
pub mod identify;
pub mod inputs;
pub mod k8s_types;
pub mod naming;
pub mod resource;
pub mod runner;
pub mod templates;

pub use serde;
pub use serde_json;
pub use serde_yaml;

pub mod prelude {
    pub use crate::cleanup::CleanupReport;
    pub use crate::client::ClusterApi;
    pub use crate::config::{BuildEnv, ClientConfig};
    pub use crate::error::Error;
    pub use crate::generator::dbaas::DbaasProvider;
    pub use crate::generator::{BuildType, BuildValues, ConfigError, EnvironmentType};
    pub use crate::inputs::BuildInputs;
    pub use crate::k8s_types::{self, K8sType};
    pub use crate::resource::K8sResource;
    pub use crate::runner::{generate_and_cleanup, run_from_environment};
    pub use crate::templates::{InventoryTemplates, TemplateGenerator};
    pub use serde::{Deserialize, Serialize};
}
