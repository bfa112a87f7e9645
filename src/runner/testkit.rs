//! In-memory stand-ins for the cluster and the DBaaS operator, for testing builds without either
use crate::client::{ApiError, ClusterApi, Error};
use crate::generator::dbaas::{Availability, DbaasError, DbaasProvider};
use crate::generator::service_types::DbaasFamily;
use crate::k8s_types::{self, K8sType};
use crate::resource::{K8sResource, ObjectId, ObjectIdRef};

use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Types that every cluster has. Anything else must be registered, either explicitly or by adding
/// a resource of that type, or listing it fails the way it does for an uninstalled CRD.
static BUILTIN_TYPES: &[&K8sType] = &[
    k8s_types::apps::v1::Deployment,
    k8s_types::core::v1::Service,
    k8s_types::core::v1::PersistentVolumeClaim,
    k8s_types::core::v1::Secret,
    k8s_types::networking_k8s_io::v1::Ingress,
    k8s_types::networking_k8s_io::v1::NetworkPolicy,
    k8s_types::batch::v1::CronJob,
];

/// Every optional CRD type the collector knows about
pub static LAGOON_CRDS: &[&K8sType] = &[
    k8s_types::k8up_io::v1::Schedule,
    k8s_types::k8up_io::v1::PreBackupPod,
    k8s_types::backup_appuio_ch::v1alpha1::Schedule,
    k8s_types::backup_appuio_ch::v1alpha1::PreBackupPod,
    k8s_types::mariadb_amazee_io::v1::MariaDBConsumer,
    k8s_types::mongodb_amazee_io::v1::MongoDBConsumer,
    k8s_types::postgres_amazee_io::v1::PostgreSQLConsumer,
];

/// A cluster that lives in memory. Label selectors are supported in their `key` (exists) and
/// `key=value` forms.
#[derive(Debug, Default)]
pub struct FakeCluster {
    resources: Mutex<HashMap<&'static K8sType, Vec<K8sResource>>>,
    deleted: Mutex<Vec<(&'static K8sType, ObjectId)>>,
    failing_lists: HashSet<&'static K8sType>,
    failing_deletes: HashSet<&'static K8sType>,
}

impl FakeCluster {
    pub fn new() -> FakeCluster {
        let cluster = FakeCluster::default();
        for k8s_type in BUILTIN_TYPES {
            cluster.register(*k8s_type);
        }
        cluster
    }

    /// A cluster with all of the optional CRDs installed
    pub fn with_lagoon_crds() -> FakeCluster {
        let cluster = FakeCluster::new();
        for k8s_type in LAGOON_CRDS {
            cluster.register(*k8s_type);
        }
        cluster
    }

    pub fn register(&self, k8s_type: &'static K8sType) {
        self.resources
            .lock()
            .unwrap()
            .entry(k8s_type)
            .or_insert_with(Vec::new);
    }

    /// Adds a resource, registering its type if needed
    pub fn with_resource(self, k8s_type: &'static K8sType, value: Value) -> FakeCluster {
        let resource = K8sResource::from_value(value).expect("resource must have a name");
        self.resources
            .lock()
            .unwrap()
            .entry(k8s_type)
            .or_insert_with(Vec::new)
            .push(resource);
        self
    }

    /// Makes every list of the type fail with a server error
    pub fn fail_lists_of(mut self, k8s_type: &'static K8sType) -> FakeCluster {
        self.failing_lists.insert(k8s_type);
        self
    }

    /// Makes every delete of the type fail with a server error
    pub fn fail_deletes_of(mut self, k8s_type: &'static K8sType) -> FakeCluster {
        self.failing_deletes.insert(k8s_type);
        self
    }

    /// Every successful delete, in order
    pub fn deleted(&self) -> Vec<(&'static K8sType, ObjectId)> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn was_deleted(&self, k8s_type: &K8sType, name: &str) -> bool {
        self.deleted
            .lock()
            .unwrap()
            .iter()
            .any(|(t, id)| *t == k8s_type && id.name() == name)
    }

    /// Names of the resources of the type that still exist
    pub fn names(&self, k8s_type: &'static K8sType) -> Vec<String> {
        self.resources
            .lock()
            .unwrap()
            .get(k8s_type)
            .map(|resources| resources.iter().map(|r| r.name().to_owned()).collect())
            .unwrap_or_default()
    }
}

fn matches_selector(resource: &K8sResource, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|requirement| !requirement.is_empty())
        .all(|requirement| match requirement.find('=') {
            Some(idx) => {
                resource.get_label_value(&requirement[..idx]) == Some(&requirement[(idx + 1)..])
            }
            None => resource.has_label(requirement),
        })
}

fn not_registered(k8s_type: &K8sType) -> Error {
    Error::Api(ApiError::not_found(format!(
        "the server could not find the requested resource ({})",
        k8s_type
    )))
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list(
        &self,
        k8s_type: &'static K8sType,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<K8sResource>, Error> {
        if self.failing_lists.contains(k8s_type) {
            return Err(Error::http(StatusCode::INTERNAL_SERVER_ERROR));
        }
        let resources = self.resources.lock().unwrap();
        let all = resources.get(k8s_type).ok_or_else(|| not_registered(k8s_type))?;
        Ok(all
            .iter()
            .filter(|r| r.namespace() == Some(namespace))
            .filter(|r| matches_selector(r, label_selector))
            .cloned()
            .collect())
    }

    async fn delete(&self, k8s_type: &'static K8sType, id: &ObjectIdRef<'_>) -> Result<(), Error> {
        if self.failing_deletes.contains(k8s_type) {
            return Err(Error::http(StatusCode::INTERNAL_SERVER_ERROR));
        }
        if let Some(resources) = self.resources.lock().unwrap().get_mut(k8s_type) {
            resources.retain(|r| r.get_object_id() != *id);
        }
        self.deleted.lock().unwrap().push((k8s_type, id.to_owned()));
        Ok(())
    }
}

/// A DBaaS operator with canned answers
#[derive(Debug)]
pub struct FakeDbaas {
    health: Availability,
    environments: HashSet<(DbaasFamily, String)>,
    health_checks: AtomicUsize,
}

impl FakeDbaas {
    pub fn new(health: Availability) -> FakeDbaas {
        FakeDbaas {
            health,
            environments: HashSet::new(),
            health_checks: AtomicUsize::new(0),
        }
    }

    /// A healthy operator that has `production` and `development` environments for every family
    pub fn available() -> FakeDbaas {
        let mut dbaas = FakeDbaas::new(Availability::Available);
        for family in [DbaasFamily::MariaDB, DbaasFamily::PostgreSQL, DbaasFamily::MongoDB].iter() {
            dbaas = dbaas
                .with_environment(*family, "production")
                .with_environment(*family, "development");
        }
        dbaas
    }

    pub fn unavailable() -> FakeDbaas {
        FakeDbaas::new(Availability::Unavailable)
    }

    pub fn with_environment(mut self, family: DbaasFamily, environment: &str) -> FakeDbaas {
        self.environments.insert((family, environment.to_owned()));
        self
    }

    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DbaasProvider for FakeDbaas {
    async fn health(&self) -> Availability {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        self.health
    }

    async fn environment_exists(
        &self,
        family: DbaasFamily,
        environment: &str,
    ) -> Result<bool, DbaasError> {
        Ok(self.environments.contains(&(family, environment.to_owned())))
    }
}
