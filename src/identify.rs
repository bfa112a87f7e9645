//! Works out which resources the current build declares, and which of the resources that exist
//! in the namespace it no longer does.
use crate::collector::LagoonEnvState;
use crate::error::Error;
use crate::generator::service_types::DbaasFamily;
use crate::generator::BuildValues;
use crate::resource::K8sResource;
use crate::templates::TemplateGenerator;

use serde_json::Value;

use std::collections::HashSet;
use std::convert::TryFrom;

/// A DBaaS consumer that the build declares, as its name and service type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerRef {
    pub name: String,
    pub service_type: String,
}

impl ConsumerRef {
    pub fn family(&self) -> Option<DbaasFamily> {
        DbaasFamily::for_type(&self.service_type)
    }
}

impl std::fmt::Display for ConsumerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.service_type)
    }
}

/// The names of everything the templates render for the current build
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredInventory {
    pub deployments: HashSet<String>,
    pub volumes: HashSet<String>,
    pub services: HashSet<String>,
    pub dbaas_consumers: HashSet<ConsumerRef>,
}

fn names(resources: Vec<K8sResource>) -> HashSet<String> {
    resources.iter().map(|r| r.name().to_owned()).collect()
}

impl DesiredInventory {
    pub fn from_templates(
        templates: &dyn TemplateGenerator,
        values: &BuildValues,
    ) -> Result<DesiredInventory, Error> {
        let dbaas_consumers: HashSet<ConsumerRef> = templates
            .dbaas_consumers(values)?
            .iter()
            .filter_map(|consumer| {
                consumer
                    .get_label_value(crate::templates::SERVICE_TYPE_LABEL)
                    .map(|service_type| ConsumerRef {
                        name: consumer.name().to_owned(),
                        service_type: service_type.to_owned(),
                    })
            })
            .collect();
        for consumer in dbaas_consumers.iter() {
            log::debug!("build declares dbaas consumer {}", consumer);
        }
        Ok(DesiredInventory {
            deployments: names(templates.deployments(values)?),
            volumes: names(templates.persistent_volume_claims(values)?),
            services: names(templates.services(values)?),
            dbaas_consumers,
        })
    }

    fn has_consumer(&self, name: &str, family: DbaasFamily) -> bool {
        self.dbaas_consumers
            .iter()
            .any(|c| c.name == name && c.family() == Some(family))
    }
}

/// The containers, volumes and ports of a Deployment, for reporting what a removal takes away
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentSummary {
    pub name: String,
    pub containers: Vec<String>,
    pub volumes: Vec<String>,
    pub ports: Vec<u16>,
}

impl DeploymentSummary {
    pub fn from_resource(deployment: &K8sResource) -> DeploymentSummary {
        let containers = deployment.array_value("/spec/template/spec/containers");
        let volumes = deployment
            .array_value("/spec/template/spec/volumes")
            .iter()
            .filter_map(|v| v.pointer("/name").and_then(Value::as_str))
            .map(str::to_owned)
            .collect();
        let ports = containers
            .iter()
            .flat_map(|c| {
                c.pointer("/ports")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or(&[])
            })
            .filter_map(|p| p.pointer("/containerPort").and_then(Value::as_u64))
            .filter_map(|p| u16::try_from(p).ok())
            .collect();
        DeploymentSummary {
            name: deployment.name().to_owned(),
            containers: containers
                .iter()
                .filter_map(|c| c.pointer("/name").and_then(Value::as_str))
                .map(str::to_owned)
                .collect(),
            volumes,
            ports,
        }
    }
}

/// The resources in the namespace that the current build no longer declares
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbandonedResources {
    pub deployments: Vec<DeploymentSummary>,
    pub volumes: Vec<String>,
    pub services: Vec<String>,
    pub mariadb_consumers: Vec<String>,
    pub mongodb_consumers: Vec<String>,
    pub postgresql_consumers: Vec<String>,
}

impl AbandonedResources {
    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
            && self.volumes.is_empty()
            && self.services.is_empty()
            && self.mariadb_consumers.is_empty()
            && self.mongodb_consumers.is_empty()
            && self.postgresql_consumers.is_empty()
    }
}

fn abandoned_names(actual: &[K8sResource], desired: &HashSet<String>) -> Vec<String> {
    actual
        .iter()
        .map(K8sResource::name)
        .filter(|name| !desired.contains(*name))
        .map(str::to_owned)
        .collect()
}

fn abandoned_consumers(
    actual: &[K8sResource],
    desired: &DesiredInventory,
    family: DbaasFamily,
) -> Vec<String> {
    actual
        .iter()
        .map(K8sResource::name)
        .filter(|name| !desired.has_consumer(name, family))
        .map(str::to_owned)
        .collect()
}

pub fn identify_abandoned(state: &LagoonEnvState, desired: &DesiredInventory) -> AbandonedResources {
    let abandoned = AbandonedResources {
        deployments: state
            .deployments
            .iter()
            .filter(|d| !desired.deployments.contains(d.name()))
            .map(DeploymentSummary::from_resource)
            .collect(),
        volumes: abandoned_names(&state.pvcs, &desired.volumes),
        services: abandoned_names(&state.services, &desired.services),
        mariadb_consumers: abandoned_consumers(&state.mariadb_consumers, desired, DbaasFamily::MariaDB),
        mongodb_consumers: abandoned_consumers(&state.mongodb_consumers, desired, DbaasFamily::MongoDB),
        postgresql_consumers: abandoned_consumers(
            &state.postgresql_consumers,
            desired,
            DbaasFamily::PostgreSQL,
        ),
    };
    log::debug!("abandoned resources: {:?}", abandoned);
    abandoned
}
