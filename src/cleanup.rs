//! Removal of the resources that a build no longer declares. Removal runs category by category,
//! in a fixed order, and stops at the first failure. The `CleanupReport` always says exactly what
//! has been removed so far.
use crate::client::{self, ClusterApi};
use crate::identify::AbandonedResources;
use crate::k8s_types::{self, K8sType};
use crate::resource::ObjectIdRef;

use std::fmt::{self, Display};

/// The names removed (or, for a dry run, that would be removed) per category
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub mariadb: Vec<String>,
    pub mongodb: Vec<String>,
    pub postgresql: Vec<String>,
    pub deployments: Vec<String>,
    pub volumes: Vec<String>,
    pub services: Vec<String>,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.mariadb.is_empty()
            && self.mongodb.is_empty()
            && self.postgresql.is_empty()
            && self.deployments.is_empty()
            && self.volumes.is_empty()
            && self.services.is_empty()
    }
}

/// A delete failed. `report` holds everything that was removed before the failure.
#[derive(Debug)]
pub struct CleanupError {
    pub report: CleanupReport,
    pub kind: &'static K8sType,
    pub name: String,
    pub source: client::Error,
}

impl Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "failed to remove {} '{}': {}", self.kind, self.name, self.source)
    }
}

impl std::error::Error for CleanupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

fn prebackuppod_name(consumer: &str) -> String {
    format!("{}-prebackuppod", consumer)
}

struct Cleanup<'a> {
    api: &'a dyn ClusterApi,
    namespace: &'a str,
    perform_deletion: bool,
    report: CleanupReport,
}

/// A failed delete: the type, the name, and what the api server said
type DeleteFailure = (&'static K8sType, String, client::Error);

impl<'a> Cleanup<'a> {
    async fn delete(&self, kind: &'static K8sType, name: &str) -> Result<(), DeleteFailure> {
        let id = ObjectIdRef::new(self.namespace, name);
        self.api
            .delete(kind, &id)
            .await
            .map_err(|err| (kind, name.to_owned(), err))
    }

    /// Removes each of the named resources, recording it in the category as soon as it's gone.
    /// With `cascade`, the pre-backup pods of each resource are removed right after it.
    async fn remove_all(
        &mut self,
        kind: &'static K8sType,
        names: &[String],
        category: fn(&mut CleanupReport) -> &mut Vec<String>,
        cascade: bool,
    ) -> Result<(), CleanupError> {
        for name in names {
            if !self.perform_deletion {
                log::info!("would remove {} {}", kind.kind, name);
                category(&mut self.report).push(name.clone());
                continue;
            }
            log::info!("removing {} {}", kind.kind, name);
            if let Err(failure) = self.delete(kind, name).await {
                return Err(self.failed(failure));
            }
            category(&mut self.report).push(name.clone());
            if cascade {
                if let Err(failure) = self.delete_prebackuppods(name).await {
                    return Err(self.failed(failure));
                }
            }
        }
        Ok(())
    }

    fn failed(&mut self, (kind, name, source): DeleteFailure) -> CleanupError {
        log::error!("failed to remove {} {}: {}", kind.kind, name, source);
        CleanupError {
            report: std::mem::take(&mut self.report),
            kind,
            name,
            source,
        }
    }

    /// Pre-backup pods aren't labeled with the consumer, so they're found by name, in both
    /// versions of the K8up api
    async fn delete_prebackuppods(&self, consumer: &str) -> Result<(), DeleteFailure> {
        let name = prebackuppod_name(consumer);
        for kind in [
            k8s_types::k8up_io::v1::PreBackupPod,
            k8s_types::backup_appuio_ch::v1alpha1::PreBackupPod,
        ]
        .iter()
        {
            log::info!("removing {} {}", kind, name);
            self.delete(*kind, &name).await?;
        }
        Ok(())
    }
}

/// Removes the abandoned resources, or only reports them if `perform_deletion` is false.
/// Deployments go first, then volumes, services, and finally DBaaS consumers along with their
/// pre-backup pods.
pub async fn run_cleanup(
    api: &dyn ClusterApi,
    namespace: &str,
    abandoned: &AbandonedResources,
    perform_deletion: bool,
) -> Result<CleanupReport, CleanupError> {
    if abandoned.is_empty() {
        log::info!("no abandoned resources in namespace {}", namespace);
        return Ok(CleanupReport::default());
    }
    if !perform_deletion {
        log::info!("dry run, nothing in namespace {} will be removed", namespace);
    }
    let mut cleanup = Cleanup {
        api,
        namespace,
        perform_deletion,
        report: CleanupReport::default(),
    };

    for deployment in abandoned.deployments.iter() {
        log::debug!(
            "deployment {} has containers {:?}, volumes {:?} and ports {:?}",
            deployment.name,
            deployment.containers,
            deployment.volumes,
            deployment.ports
        );
    }
    let deployments: Vec<String> = abandoned.deployments.iter().map(|d| d.name.clone()).collect();
    cleanup
        .remove_all(k8s_types::apps::v1::Deployment, &deployments, |r| &mut r.deployments, false)
        .await?;
    cleanup
        .remove_all(
            k8s_types::core::v1::PersistentVolumeClaim,
            &abandoned.volumes,
            |r| &mut r.volumes,
            false,
        )
        .await?;
    cleanup
        .remove_all(k8s_types::core::v1::Service, &abandoned.services, |r| &mut r.services, false)
        .await?;
    cleanup
        .remove_all(
            k8s_types::mariadb_amazee_io::v1::MariaDBConsumer,
            &abandoned.mariadb_consumers,
            |r| &mut r.mariadb,
            true,
        )
        .await?;
    cleanup
        .remove_all(
            k8s_types::mongodb_amazee_io::v1::MongoDBConsumer,
            &abandoned.mongodb_consumers,
            |r| &mut r.mongodb,
            true,
        )
        .await?;
    cleanup
        .remove_all(
            k8s_types::postgres_amazee_io::v1::PostgreSQLConsumer,
            &abandoned.postgresql_consumers,
            |r| &mut r.postgresql,
            true,
        )
        .await?;
    Ok(cleanup.report)
}
