//! Blocking entry points that run a whole build: assembling the `BuildValues`, collecting the
//! state of the namespace, and removing whatever the build no longer declares. Everything runs
//! sequentially on a current thread runtime.
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

use crate::cleanup::{run_cleanup, CleanupReport};
use crate::client::{Client, ClusterApi};
use crate::collector::collect;
use crate::config::{service_account_namespace, BuildEnv, ClientConfig};
use crate::error::{Error, InputError};
use crate::generator::dbaas::{DbaasProvider, HttpDbaasProvider, DEFAULT_DBAAS_ENDPOINT};
use crate::generator::{generate_build_values, BuildValues, GeneratorOptions};
use crate::identify::{identify_abandoned, DesiredInventory};
use crate::inputs::BuildInputs;
use crate::templates::{InventoryTemplates, TemplateGenerator};

use tokio::runtime::Runtime;

use std::path::Path;

/// User agent for requests to the api server
pub const USER_AGENT: &str = "lagoon-build";

fn current_thread_runtime() -> Result<Runtime, Error> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime)
}

/// Assembles the build values and removes abandoned resources from the namespace. With
/// `perform_deletion` set to false, nothing is removed and the report lists what would be.
pub async fn build_and_cleanup(
    inputs: &BuildInputs,
    env: &BuildEnv,
    api: &dyn ClusterApi,
    dbaas: &dyn DbaasProvider,
    templates: &dyn TemplateGenerator,
    perform_deletion: bool,
) -> Result<(BuildValues, CleanupReport), Error> {
    let options = GeneratorOptions::from_env(env)?;
    let values = generate_build_values(inputs, env, &options, dbaas).await?;
    let report = cleanup_abandoned(&values, api, templates, perform_deletion).await?;
    Ok((values, report))
}

/// Compares the resources the templates render for `values` with what exists in the namespace,
/// and removes the difference
pub async fn cleanup_abandoned(
    values: &BuildValues,
    api: &dyn ClusterApi,
    templates: &dyn TemplateGenerator,
    perform_deletion: bool,
) -> Result<CleanupReport, Error> {
    let desired = DesiredInventory::from_templates(templates, values)?;
    let state = collect(api, &values.namespace).await?;
    let abandoned = identify_abandoned(&state, &desired);
    let report = run_cleanup(api, &values.namespace, &abandoned, perform_deletion).await?;
    Ok(report)
}

/// Blocking version of `build_and_cleanup`, returning only the report
pub fn generate_and_cleanup(
    inputs: &BuildInputs,
    env: &BuildEnv,
    api: &dyn ClusterApi,
    dbaas: &dyn DbaasProvider,
    templates: &dyn TemplateGenerator,
    perform_deletion: bool,
) -> Result<CleanupReport, Error> {
    let runtime = current_thread_runtime()?;
    let (_, report) = runtime.block_on(build_and_cleanup(
        inputs,
        env,
        api,
        dbaas,
        templates,
        perform_deletion,
    ))?;
    Ok(report)
}

/// Blocking assembly of the build values alone
pub fn generate_values(
    inputs: &BuildInputs,
    env: &BuildEnv,
    dbaas: &dyn DbaasProvider,
) -> Result<BuildValues, Error> {
    let options = GeneratorOptions::from_env(env)?;
    let runtime = current_thread_runtime()?;
    let values = runtime.block_on(generate_build_values(inputs, env, &options, dbaas))?;
    Ok(values)
}

/// Runs a build the way the build pod does: the inputs are read from `source_dir`, the build
/// environment from the process, and the cluster is reached through the pod's service account
/// (or the local kubeconfig). Without a `NAMESPACE` variable, the namespace of the service account
/// is used.
pub fn run_from_environment(source_dir: &Path, perform_deletion: bool) -> Result<CleanupReport, Error> {
    let mut env = BuildEnv::from_process();
    if !env.is_set("NAMESPACE") {
        if let Some(namespace) = service_account_namespace() {
            log::debug!("using service account namespace {}", namespace);
            env = env.with("NAMESPACE", namespace);
        }
    }
    let inputs = BuildInputs::from_directory(source_dir, &env).map_err(InputError)?;
    let client_config = ClientConfig::detect(USER_AGENT)?;
    run_with_client_config(&inputs, &env, client_config, perform_deletion)
}

pub fn run_with_client_config(
    inputs: &BuildInputs,
    env: &BuildEnv,
    client_config: ClientConfig,
    perform_deletion: bool,
) -> Result<CleanupReport, Error> {
    let client = Client::new(client_config)?;
    let dbaas = HttpDbaasProvider::new(env.get_or("DBAAS_OPERATOR_HTTP", DEFAULT_DBAAS_ENDPOINT));
    let report = generate_and_cleanup(
        inputs,
        env,
        &client,
        &dbaas,
        &InventoryTemplates,
        perform_deletion,
    )?;
    log::info!("cleanup finished: {:?}", report);
    Ok(report)
}
