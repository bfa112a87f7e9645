use lagoon_build::cleanup::CleanupError;
use lagoon_build::prelude::*;
use lagoon_build::runner::testkit::{FakeCluster, FakeDbaas};

use lagoon_build::serde_json::{json, Value};

static MARIADB_CONSUMER: &K8sType = k8s_types::mariadb_amazee_io::v1::MariaDBConsumer;
static PREBACKUPPOD_V1: &K8sType = k8s_types::k8up_io::v1::PreBackupPod;
static PREBACKUPPOD_V1ALPHA1: &K8sType = k8s_types::backup_appuio_ch::v1alpha1::PreBackupPod;

const NAMESPACE: &str = "example-main";

const LAGOON_YML: &str = r#"
docker-compose-yaml: docker-compose.yml
environments:
  main:
    routes:
      - nginx:
          - www.example.com
"#;

const COMPOSE_WITHOUT_DATABASE: &str = r#"
services:
  cli:
    labels:
      lagoon.type: cli-persistent
      lagoon.persistent.name: nginx
  nginx:
    labels:
      lagoon.type: nginx-php-persistent
  php:
    labels:
      lagoon.type: nginx-php-persistent
      lagoon.name: nginx
"#;

const COMPOSE_WITH_DATABASE: &str = r#"
services:
  nginx:
    labels:
      lagoon.type: nginx
  mariadb:
    labels:
      lagoon.type: mariadb
"#;

fn setup() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "lagoon_build=debug");
    }
    let _ = env_logger::try_init();
}

fn build_env() -> BuildEnv {
    BuildEnv::from_pairs(vec![
        ("PROJECT", "example"),
        ("ENVIRONMENT", "main"),
        ("BUILD_TYPE", "branch"),
        ("ENVIRONMENT_TYPE", "production"),
        ("ROUTER_URL", "example.lagoon.sh"),
    ])
}

fn inputs(compose: &str) -> BuildInputs {
    BuildInputs::from_sources(LAGOON_YML, compose, "[]", "[]", &build_env())
        .expect("failed to parse build inputs")
}

fn labeled(name: &str, service_type: &str) -> Value {
    json!({
        "metadata": {
            "name": name,
            "namespace": NAMESPACE,
            "labels": {
                "lagoon.sh/service": name,
                "lagoon.sh/service-type": service_type,
            }
        }
    })
}

/// A namespace that was deployed while the compose file still had a mariadb service
fn cluster_with_abandoned_mariadb() -> FakeCluster {
    FakeCluster::with_lagoon_crds()
        .with_resource(k8s_types::apps::v1::Deployment, labeled("nginx", "nginx-php-persistent"))
        .with_resource(k8s_types::apps::v1::Deployment, labeled("cli", "cli-persistent"))
        .with_resource(k8s_types::core::v1::Service, labeled("nginx", "nginx-php-persistent"))
        .with_resource(k8s_types::core::v1::PersistentVolumeClaim, labeled("nginx", "nginx-php-persistent"))
        .with_resource(MARIADB_CONSUMER, labeled("mariadb", "mariadb-dbaas"))
        .with_resource(PREBACKUPPOD_V1, labeled("mariadb-prebackuppod", "mariadb-dbaas"))
        .with_resource(PREBACKUPPOD_V1ALPHA1, labeled("mariadb-prebackuppod", "mariadb-dbaas"))
}

#[test]
fn dry_run_reports_abandoned_mariadb_without_deleting() {
    setup();
    let cluster = cluster_with_abandoned_mariadb();
    let report = generate_and_cleanup(
        &inputs(COMPOSE_WITHOUT_DATABASE),
        &build_env(),
        &cluster,
        &FakeDbaas::available(),
        &InventoryTemplates,
        false,
    )
    .expect("cleanup failed");

    assert_eq!(vec!["mariadb".to_owned()], report.mariadb);
    assert!(report.mongodb.is_empty());
    assert!(report.postgresql.is_empty());
    assert!(report.deployments.is_empty());
    assert!(report.volumes.is_empty());
    assert!(report.services.is_empty());
    assert!(cluster.deleted().is_empty());
    assert_eq!(vec!["mariadb".to_owned()], cluster.names(MARIADB_CONSUMER));
}

#[test]
fn destructive_run_deletes_consumer_and_both_prebackuppods() {
    setup();
    let cluster = cluster_with_abandoned_mariadb();
    let report = generate_and_cleanup(
        &inputs(COMPOSE_WITHOUT_DATABASE),
        &build_env(),
        &cluster,
        &FakeDbaas::available(),
        &InventoryTemplates,
        true,
    )
    .expect("cleanup failed");

    assert_eq!(vec!["mariadb".to_owned()], report.mariadb);
    assert!(cluster.was_deleted(MARIADB_CONSUMER, "mariadb"));
    assert!(cluster.was_deleted(PREBACKUPPOD_V1, "mariadb-prebackuppod"));
    assert!(cluster.was_deleted(PREBACKUPPOD_V1ALPHA1, "mariadb-prebackuppod"));
    assert!(cluster.names(MARIADB_CONSUMER).is_empty());
    assert!(cluster.names(PREBACKUPPOD_V1).is_empty());
    assert!(cluster.names(PREBACKUPPOD_V1ALPHA1).is_empty());
    assert_eq!(
        vec!["nginx".to_owned(), "cli".to_owned()],
        cluster.names(k8s_types::apps::v1::Deployment)
    );
    assert_eq!(3, cluster.deleted().len());
}

#[test]
fn declared_consumer_is_kept() {
    setup();
    let cluster = FakeCluster::with_lagoon_crds()
        .with_resource(k8s_types::apps::v1::Deployment, labeled("nginx", "nginx"))
        .with_resource(MARIADB_CONSUMER, labeled("mariadb", "mariadb-dbaas"));
    let dbaas = FakeDbaas::available();
    let report = generate_and_cleanup(
        &inputs(COMPOSE_WITH_DATABASE),
        &build_env(),
        &cluster,
        &dbaas,
        &InventoryTemplates,
        true,
    )
    .expect("cleanup failed");

    assert!(report.is_empty());
    assert!(cluster.deleted().is_empty());
    assert_eq!(1, dbaas.health_checks());
}

#[test]
fn database_that_fell_back_to_single_abandons_its_consumer() {
    setup();
    let cluster = FakeCluster::with_lagoon_crds()
        .with_resource(MARIADB_CONSUMER, labeled("mariadb", "mariadb-dbaas"));
    let report = generate_and_cleanup(
        &inputs(COMPOSE_WITH_DATABASE),
        &build_env(),
        &cluster,
        &FakeDbaas::unavailable(),
        &InventoryTemplates,
        false,
    )
    .expect("cleanup failed");

    assert_eq!(vec!["mariadb".to_owned()], report.mariadb);
}

#[test]
fn clusters_without_dbaas_crds_are_cleaned_up() {
    setup();
    let cluster = FakeCluster::new()
        .with_resource(k8s_types::apps::v1::Deployment, labeled("node", "node"))
        .with_resource(k8s_types::core::v1::Service, labeled("node", "node"));
    let report = generate_and_cleanup(
        &inputs(COMPOSE_WITHOUT_DATABASE),
        &build_env(),
        &cluster,
        &FakeDbaas::available(),
        &InventoryTemplates,
        true,
    )
    .expect("cleanup failed");

    assert_eq!(vec!["node".to_owned()], report.deployments);
    assert_eq!(vec!["node".to_owned()], report.services);
    assert!(cluster.names(k8s_types::apps::v1::Deployment).is_empty());
}

#[test]
fn failed_delete_returns_the_partial_report() {
    setup();
    let cluster = cluster_with_abandoned_mariadb()
        .with_resource(k8s_types::apps::v1::Deployment, labeled("node", "node"))
        .fail_deletes_of(MARIADB_CONSUMER);
    let err = generate_and_cleanup(
        &inputs(COMPOSE_WITHOUT_DATABASE),
        &build_env(),
        &cluster,
        &FakeDbaas::available(),
        &InventoryTemplates,
        true,
    )
    .expect_err("cleanup should have failed");

    let cleanup_error = err
        .as_type::<CleanupError>()
        .expect("expected a CleanupError");
    assert_eq!("mariadb", cleanup_error.name);
    assert_eq!(vec!["node".to_owned()], cleanup_error.report.deployments);
    assert!(cleanup_error.report.mariadb.is_empty());
    assert!(!cluster.was_deleted(PREBACKUPPOD_V1, "mariadb-prebackuppod"));
}

#[test]
fn configuration_errors_surface_before_anything_is_collected() {
    setup();
    let cluster = FakeCluster::new().fail_lists_of(k8s_types::apps::v1::Deployment);
    let compose = r#"
services:
  node:
    labels:
      lagoon.type: basic-persistent
"#;
    let err = generate_and_cleanup(
        &inputs(compose),
        &build_env(),
        &cluster,
        &FakeDbaas::available(),
        &InventoryTemplates,
        true,
    )
    .expect_err("build should have failed");
    let config_error = err.as_type::<ConfigError>().expect("expected a ConfigError");
    assert!(config_error.to_string().contains("no valid mount path"));
}
