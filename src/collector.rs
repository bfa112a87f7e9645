//! Takes a snapshot of the Lagoon managed resources in a namespace
use crate::client::{ClusterApi, Error};
use crate::k8s_types::{self, K8sType};
use crate::resource::K8sResource;

/// Selector for resources that belong to a compose service
pub const SERVICE_SELECTOR: &str = "lagoon.sh/service";
/// Selector for resources rendered from a template that isn't tied to a single service
pub const TEMPLATE_SELECTOR: &str = "lagoon.sh/template";

/// The Lagoon managed resources of one namespace at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LagoonEnvState {
    pub deployments: Vec<K8sResource>,
    pub services: Vec<K8sResource>,
    pub pvcs: Vec<K8sResource>,
    pub secrets: Vec<K8sResource>,
    pub ingresses: Vec<K8sResource>,
    pub network_policies: Vec<K8sResource>,
    pub cronjobs: Vec<K8sResource>,
    pub schedules_v1: Vec<K8sResource>,
    pub schedules_v1alpha1: Vec<K8sResource>,
    pub prebackuppods_v1: Vec<K8sResource>,
    pub prebackuppods_v1alpha1: Vec<K8sResource>,
    pub mariadb_consumers: Vec<K8sResource>,
    pub mongodb_consumers: Vec<K8sResource>,
    pub postgresql_consumers: Vec<K8sResource>,
}

async fn list_required(
    api: &dyn ClusterApi,
    k8s_type: &'static K8sType,
    namespace: &str,
    selector: &str,
) -> Result<Vec<K8sResource>, Error> {
    let resources = api.list(k8s_type, namespace, selector).await?;
    log::debug!("found {} {} in {}", resources.len(), k8s_type.plural_kind, namespace);
    Ok(resources)
}

/// Lists a kind that's defined by a CRD which may not be installed. The api server answers with a
/// 404 in that case, which we treat the same as an empty list.
async fn list_optional(
    api: &dyn ClusterApi,
    k8s_type: &'static K8sType,
    namespace: &str,
    selector: &str,
) -> Result<Vec<K8sResource>, Error> {
    match api.list(k8s_type, namespace, selector).await {
        Err(ref err) if err.is_not_found() => {
            log::debug!("{} is not registered in the cluster, skipping", k8s_type);
            Ok(Vec::new())
        }
        other => {
            let resources = other?;
            log::debug!("found {} {} in {}", resources.len(), k8s_type.plural_kind, namespace);
            Ok(resources)
        }
    }
}

/// Collects every kind of resource. Fails on the first error that isn't a missing CRD.
pub async fn collect(api: &dyn ClusterApi, namespace: &str) -> Result<LagoonEnvState, Error> {
    log::info!("collecting current state of namespace {}", namespace);
    Ok(LagoonEnvState {
        deployments: list_required(api, k8s_types::apps::v1::Deployment, namespace, SERVICE_SELECTOR)
            .await?,
        services: list_required(api, k8s_types::core::v1::Service, namespace, SERVICE_SELECTOR)
            .await?,
        pvcs: list_required(
            api,
            k8s_types::core::v1::PersistentVolumeClaim,
            namespace,
            SERVICE_SELECTOR,
        )
        .await?,
        secrets: list_required(api, k8s_types::core::v1::Secret, namespace, SERVICE_SELECTOR)
            .await?,
        ingresses: list_required(
            api,
            k8s_types::networking_k8s_io::v1::Ingress,
            namespace,
            SERVICE_SELECTOR,
        )
        .await?,
        network_policies: list_required(
            api,
            k8s_types::networking_k8s_io::v1::NetworkPolicy,
            namespace,
            TEMPLATE_SELECTOR,
        )
        .await?,
        cronjobs: list_required(api, k8s_types::batch::v1::CronJob, namespace, SERVICE_SELECTOR)
            .await?,
        schedules_v1: list_optional(api, k8s_types::k8up_io::v1::Schedule, namespace, TEMPLATE_SELECTOR)
            .await?,
        schedules_v1alpha1: list_optional(
            api,
            k8s_types::backup_appuio_ch::v1alpha1::Schedule,
            namespace,
            TEMPLATE_SELECTOR,
        )
        .await?,
        prebackuppods_v1: list_optional(
            api,
            k8s_types::k8up_io::v1::PreBackupPod,
            namespace,
            SERVICE_SELECTOR,
        )
        .await?,
        prebackuppods_v1alpha1: list_optional(
            api,
            k8s_types::backup_appuio_ch::v1alpha1::PreBackupPod,
            namespace,
            SERVICE_SELECTOR,
        )
        .await?,
        mariadb_consumers: list_optional(
            api,
            k8s_types::mariadb_amazee_io::v1::MariaDBConsumer,
            namespace,
            SERVICE_SELECTOR,
        )
        .await?,
        mongodb_consumers: list_optional(
            api,
            k8s_types::mongodb_amazee_io::v1::MongoDBConsumer,
            namespace,
            SERVICE_SELECTOR,
        )
        .await?,
        postgresql_consumers: list_optional(
            api,
            k8s_types::postgres_amazee_io::v1::PostgreSQLConsumer,
            namespace,
            SERVICE_SELECTOR,
        )
        .await?,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::runner::testkit::FakeCluster;
    use serde_json::json;

    fn run<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn labeled(name: &str) -> serde_json::Value {
        json!({
            "metadata": {
                "name": name,
                "namespace": "example-main",
                "labels": {"lagoon.sh/service": name},
            }
        })
    }

    #[test]
    fn missing_crds_leave_their_lists_empty() {
        let cluster = FakeCluster::new()
            .with_resource(k8s_types::apps::v1::Deployment, labeled("nginx"))
            .with_resource(k8s_types::core::v1::Service, labeled("nginx"));
        let state = run(collect(&cluster, "example-main")).unwrap();
        assert_eq!(1, state.deployments.len());
        assert_eq!(1, state.services.len());
        assert!(state.mariadb_consumers.is_empty());
        assert!(state.schedules_v1alpha1.is_empty());
    }

    #[test]
    fn installed_crds_are_listed() {
        let cluster = FakeCluster::with_lagoon_crds()
            .with_resource(k8s_types::mariadb_amazee_io::v1::MariaDBConsumer, labeled("mariadb"));
        let state = run(collect(&cluster, "example-main")).unwrap();
        assert_eq!("mariadb", state.mariadb_consumers[0].name());
    }

    #[test]
    fn other_errors_abort_the_collection() {
        let cluster = FakeCluster::new().fail_lists_of(k8s_types::core::v1::Secret);
        let err = run(collect(&cluster, "example-main")).unwrap_err();
        assert!(err.is_http_status(500));

        let cluster = FakeCluster::with_lagoon_crds()
            .fail_lists_of(k8s_types::postgres_amazee_io::v1::PostgreSQLConsumer);
        assert!(run(collect(&cluster, "example-main")).is_err());
    }
}
