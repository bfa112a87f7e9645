//! The seam between the build model and the functions that render it into Kubernetes objects.
//! Cleanup only ever looks at the names and labels of the rendered objects (and the containers of
//! Deployments), so `InventoryTemplates` renders just enough of each object to carry those.
use crate::error::Error;
use crate::generator::service_types::DbaasFamily;
use crate::generator::services::ServiceValues;
use crate::generator::BuildValues;
use crate::k8s_types::K8sType;
use crate::resource::K8sResource;

use serde_json::{json, Value};

pub const SERVICE_LABEL: &str = "lagoon.sh/service";
pub const SERVICE_TYPE_LABEL: &str = "lagoon.sh/service-type";
pub const TEMPLATE_LABEL: &str = "lagoon.sh/template";
pub const PROJECT_LABEL: &str = "lagoon.sh/project";
pub const ENVIRONMENT_LABEL: &str = "lagoon.sh/environment";

pub const BACKUP_SCHEDULE_NAME: &str = "k8up-lagoon-backup-schedule";
pub const ISOLATION_POLICY_NAME: &str = "isolation-network-policy";

/// Renders a `BuildValues` into Kubernetes objects, one function per kind. Every function must be
/// a pure function of the build values.
pub trait TemplateGenerator {
    fn deployments(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error>;
    fn services(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error>;
    fn persistent_volume_claims(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error>;
    fn cronjobs(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error>;
    fn ingresses(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error>;
    fn network_policies(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error>;
    fn dbaas_consumers(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error>;
    fn backup_schedules(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error>;
}

/// The consumer type that the DBaaS operator of the family reconciles
pub fn consumer_type(family: DbaasFamily) -> &'static K8sType {
    match family {
        DbaasFamily::MariaDB => crate::k8s_types::mariadb_amazee_io::v1::MariaDBConsumer,
        DbaasFamily::MongoDB => crate::k8s_types::mongodb_amazee_io::v1::MongoDBConsumer,
        DbaasFamily::PostgreSQL => crate::k8s_types::postgres_amazee_io::v1::PostgreSQLConsumer,
    }
}

/// Renders skeleton objects that carry names, labels and, for Deployments, containers with their
/// ports and volume mounts
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryTemplates;

impl InventoryTemplates {
    fn labels(values: &BuildValues, service: Option<&ServiceValues>, template: &str) -> Value {
        let mut labels = json!({
            PROJECT_LABEL: values.project.as_str(),
            ENVIRONMENT_LABEL: values.environment.as_str(),
            TEMPLATE_LABEL: template,
        });
        if let Some(service) = service {
            labels[SERVICE_LABEL] = Value::from(service.override_name.as_str());
            labels[SERVICE_TYPE_LABEL] = Value::from(service.service_type.as_str());
        }
        labels
    }

    fn object(
        k8s_type: &K8sType,
        name: &str,
        values: &BuildValues,
        service: Option<&ServiceValues>,
        template: &str,
        spec: Value,
    ) -> Result<K8sResource, Error> {
        let value = json!({
            "apiVersion": k8s_type.api_version,
            "kind": k8s_type.kind,
            "metadata": {
                "name": name,
                "namespace": values.namespace.as_str(),
                "labels": InventoryTemplates::labels(values, service, template),
            },
            "spec": spec,
        });
        Ok(K8sResource::from_value(value)?)
    }
}

fn deploys(service: &ServiceValues) -> bool {
    service
        .catalogue_entry()
        .map(|entry| entry.deployment)
        .unwrap_or(false)
}

fn ports(service: &ServiceValues) -> &'static [u16] {
    service
        .catalogue_entry()
        .map(|entry| entry.ports)
        .unwrap_or(&[])
}

impl TemplateGenerator for InventoryTemplates {
    fn deployments(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error> {
        let mut deployments = Vec::new();
        for service in values.services.iter().filter(|s| deploys(s)) {
            let mut volume_mounts = Vec::new();
            let mut volumes = Vec::new();
            if let Some(persistent) = service.persistent.as_ref() {
                volume_mounts.push(json!({"name": persistent.name, "mountPath": persistent.path}));
                volumes.push(json!({
                    "name": persistent.name,
                    "persistentVolumeClaim": {"claimName": persistent.name},
                }));
            }
            let container_ports: Vec<Value> = ports(service)
                .iter()
                .map(|port| json!({"containerPort": port, "protocol": "TCP"}))
                .collect();
            let mut containers = vec![json!({
                "name": service.name,
                "image": service.image,
                "ports": container_ports,
                "volumeMounts": volume_mounts,
            })];
            if let Some(linked) = service.linked_service.as_ref() {
                containers.push(json!({
                    "name": linked.name,
                    "image": linked.image,
                    "volumeMounts": volume_mounts,
                }));
            }
            let spec = json!({
                "replicas": service.replicas.unwrap_or(1),
                "template": {
                    "spec": {
                        "containers": containers,
                        "volumes": volumes,
                    }
                }
            });
            deployments.push(InventoryTemplates::object(
                crate::k8s_types::apps::v1::Deployment,
                &service.override_name,
                values,
                Some(service),
                "deployment",
                spec,
            )?);
        }
        Ok(deployments)
    }

    fn services(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error> {
        values
            .services
            .iter()
            .filter(|s| deploys(s) && !ports(s).is_empty())
            .map(|service| {
                let service_ports: Vec<Value> = ports(service)
                    .iter()
                    .map(|port| json!({"port": port, "targetPort": port, "protocol": "TCP"}))
                    .collect();
                InventoryTemplates::object(
                    crate::k8s_types::core::v1::Service,
                    &service.override_name,
                    values,
                    Some(service),
                    "service",
                    json!({ "ports": service_ports }),
                )
            })
            .collect()
    }

    fn persistent_volume_claims(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error> {
        let mut claims = Vec::new();
        // a volume named after another service belongs to that service
        for service in values.services.iter() {
            let persistent = match service.persistent.as_ref() {
                Some(p) if p.name == service.override_name => p,
                _ => continue,
            };
            claims.push(InventoryTemplates::object(
                crate::k8s_types::core::v1::PersistentVolumeClaim,
                &persistent.name,
                values,
                Some(service),
                "persistentvolumeclaim",
                json!({"resources": {"requests": {"storage": persistent.size}}}),
            )?);
        }
        for volume in values.custom_volumes.iter() {
            claims.push(InventoryTemplates::object(
                crate::k8s_types::core::v1::PersistentVolumeClaim,
                &volume.name,
                values,
                None,
                "persistentvolumeclaim",
                json!({"resources": {"requests": {"storage": volume.size}}}),
            )?);
        }
        Ok(claims)
    }

    fn cronjobs(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error> {
        let mut cronjobs = Vec::new();
        for service in values.services.iter() {
            for cronjob in service.native_cronjobs.iter() {
                cronjobs.push(InventoryTemplates::object(
                    crate::k8s_types::batch::v1::CronJob,
                    &cronjob.name,
                    values,
                    Some(service),
                    "cronjob",
                    json!({"schedule": cronjob.schedule}),
                )?);
            }
        }
        Ok(cronjobs)
    }

    fn ingresses(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error> {
        values
            .routes
            .iter()
            .chain(values.autogenerated_routes.iter())
            .map(|route| {
                let service = values.services.iter().find(|s| s.override_name == route.service);
                let hosts: Vec<&str> = std::iter::once(route.domain.as_str())
                    .chain(route.alternative_names.iter().map(String::as_str))
                    .collect();
                InventoryTemplates::object(
                    crate::k8s_types::networking_k8s_io::v1::Ingress,
                    &route.domain,
                    values,
                    service,
                    "ingress",
                    json!({"tls": [{"hosts": hosts}]}),
                )
            })
            .collect()
    }

    fn network_policies(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error> {
        if !values.feature_flags.isolation_network_policy {
            return Ok(Vec::new());
        }
        let policy = InventoryTemplates::object(
            crate::k8s_types::networking_k8s_io::v1::NetworkPolicy,
            ISOLATION_POLICY_NAME,
            values,
            None,
            "isolation-network-policy",
            json!({"podSelector": {}}),
        )?;
        Ok(vec![policy])
    }

    fn dbaas_consumers(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error> {
        let mut consumers = Vec::new();
        for service in values.services.iter().filter(|s| s.is_dbaas) {
            let family = match DbaasFamily::for_type(&service.service_type) {
                Some(family) => family,
                None => continue,
            };
            consumers.push(InventoryTemplates::object(
                consumer_type(family),
                &service.override_name,
                values,
                Some(service),
                "dbaas",
                json!({"environment": service.dbaas_environment}),
            )?);
        }
        Ok(consumers)
    }

    fn backup_schedules(&self, values: &BuildValues) -> Result<Vec<K8sResource>, Error> {
        let backup = &values.backup;
        let schedule = InventoryTemplates::object(
            crate::k8s_types::k8up_io::v1::Schedule,
            BACKUP_SCHEDULE_NAME,
            values,
            None,
            "k8up-schedule",
            json!({
                "backup": {"schedule": backup.backup_schedule},
                "check": {"schedule": backup.check_schedule},
                "prune": {
                    "schedule": backup.prune_schedule,
                    "retention": {
                        "keepHourly": backup.prune_retention.hourly,
                        "keepDaily": backup.prune_retention.daily,
                        "keepWeekly": backup.prune_retention.weekly,
                        "keepMonthly": backup.prune_retention.monthly,
                    },
                },
            }),
        )?;
        Ok(vec![schedule])
    }
}
