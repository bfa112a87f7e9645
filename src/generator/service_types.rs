//! The catalogue of supported service types
use lazy_static::lazy_static;

use std::collections::HashMap;

pub const DEFAULT_PERSISTENT_SIZE: &str = "5Gi";

#[derive(Debug, Clone, PartialEq)]
pub struct PersistentDefaults {
    /// The mount path. An empty path means the path has to be given with a `lagoon.persistent` label.
    pub path: &'static str,
    pub size: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceType {
    pub name: &'static str,
    pub ports: &'static [u16],
    /// Name of a second container that has to be supplied by a linked compose service
    pub secondary_container: Option<&'static str>,
    pub persistent: Option<PersistentDefaults>,
    /// Whether the type serves http traffic that autogenerated routes can point to
    pub autogenerated_routes: bool,
    /// Whether the type runs as a deployment in the namespace (DBaaS types do not)
    pub deployment: bool,
}

macro_rules! service_type {
    ($name:expr, ports: $ports:expr, secondary: $secondary:expr, persistent: $persistent:expr, routes: $routes:expr) => {
        service_type!($name, ports: $ports, secondary: $secondary, persistent: $persistent, routes: $routes, deployment: true)
    };
    ($name:expr, ports: $ports:expr, secondary: $secondary:expr, persistent: $persistent:expr, routes: $routes:expr, deployment: $deployment:expr) => {
        ServiceType {
            name: $name,
            ports: $ports,
            secondary_container: $secondary,
            persistent: $persistent,
            autogenerated_routes: $routes,
            deployment: $deployment,
        }
    };
}

fn persistent(path: &'static str) -> Option<PersistentDefaults> {
    Some(PersistentDefaults {
        path,
        size: DEFAULT_PERSISTENT_SIZE,
    })
}

lazy_static! {
    static ref CATALOGUE: HashMap<&'static str, ServiceType> = {
        let types = vec![
            service_type!("basic", ports: &[3000], secondary: None, persistent: None, routes: true),
            service_type!("basic-persistent", ports: &[3000], secondary: None, persistent: persistent(""), routes: true),
            service_type!("cli", ports: &[], secondary: None, persistent: None, routes: false),
            service_type!("cli-persistent", ports: &[], secondary: None, persistent: persistent("/app/docroot/sites/default/files/"), routes: false),
            service_type!("elasticsearch", ports: &[9200], secondary: None, persistent: persistent("/usr/share/elasticsearch/data"), routes: false),
            service_type!("opensearch", ports: &[9200], secondary: None, persistent: persistent("/usr/share/opensearch/data"), routes: false),
            service_type!("mariadb-single", ports: &[3306], secondary: None, persistent: persistent("/var/lib/mysql"), routes: false),
            service_type!("mariadb-dbaas", ports: &[], secondary: None, persistent: None, routes: false, deployment: false),
            service_type!("mongodb-single", ports: &[27017], secondary: None, persistent: persistent("/data/db"), routes: false),
            service_type!("mongodb-dbaas", ports: &[], secondary: None, persistent: None, routes: false, deployment: false),
            service_type!("postgres-single", ports: &[5432], secondary: None, persistent: persistent("/var/lib/postgresql/data"), routes: false),
            service_type!("postgres-dbaas", ports: &[], secondary: None, persistent: None, routes: false, deployment: false),
            service_type!("nginx", ports: &[8080], secondary: None, persistent: None, routes: true),
            service_type!("nginx-php", ports: &[8080], secondary: Some("php"), persistent: None, routes: true),
            service_type!("nginx-php-persistent", ports: &[8080], secondary: Some("php"), persistent: persistent("/app/docroot/sites/default/files/"), routes: true),
            service_type!("node", ports: &[3000], secondary: None, persistent: None, routes: true),
            service_type!("node-persistent", ports: &[3000], secondary: None, persistent: persistent(""), routes: true),
            service_type!("python", ports: &[8800], secondary: None, persistent: None, routes: true),
            service_type!("python-persistent", ports: &[8800], secondary: None, persistent: persistent(""), routes: true),
            service_type!("rabbitmq", ports: &[5672, 15672], secondary: None, persistent: persistent("/var/lib/rabbitmq"), routes: false),
            service_type!("redis", ports: &[6379], secondary: None, persistent: None, routes: false),
            service_type!("redis-persistent", ports: &[6379], secondary: None, persistent: persistent("/data"), routes: false),
            service_type!("solr", ports: &[8983], secondary: None, persistent: persistent("/var/solr"), routes: false),
            service_type!("varnish", ports: &[8080], secondary: None, persistent: None, routes: true),
            service_type!("varnish-persistent", ports: &[8080], secondary: None, persistent: persistent("/var/cache/varnish"), routes: true),
            service_type!("worker", ports: &[], secondary: None, persistent: None, routes: false),
            service_type!("worker-persistent", ports: &[], secondary: None, persistent: persistent(""), routes: false),
        ];
        types.into_iter().map(|t| (t.name, t)).collect()
    };
}

/// Older names that are still accepted and rewritten to their current equivalent
static LEGACY_TYPES: &[(&str, &str)] = &[
    ("mariadb-shared", "mariadb-dbaas"),
    ("postgres-shared", "postgres-dbaas"),
    ("mongo-shared", "mongodb-dbaas"),
];

/// The type that means "don't deploy this service"
pub const NONE_TYPE: &str = "none";

pub fn lookup(name: &str) -> Option<&'static ServiceType> {
    CATALOGUE.get(name)
}

pub fn remap_legacy(name: &str) -> &str {
    LEGACY_TYPES
        .iter()
        .find(|(legacy, _)| *legacy == name)
        .map(|(_, current)| *current)
        .unwrap_or(name)
}

/// The database families that can be provided by a DBaaS operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbaasFamily {
    MariaDB,
    PostgreSQL,
    MongoDB,
}

impl DbaasFamily {
    /// The name the DBaaS operator uses for this family, and the prefix of the service types
    pub fn provider(self) -> &'static str {
        match self {
            DbaasFamily::MariaDB => "mariadb",
            DbaasFamily::PostgreSQL => "postgres",
            DbaasFamily::MongoDB => "mongodb",
        }
    }

    /// Returns the family if the type may be provisioned through a DBaaS operator
    pub fn for_type(service_type: &str) -> Option<DbaasFamily> {
        match service_type {
            "mariadb" | "mariadb-dbaas" => Some(DbaasFamily::MariaDB),
            "postgres" | "postgres-dbaas" => Some(DbaasFamily::PostgreSQL),
            "mongo" | "mongodb" | "mongodb-dbaas" => Some(DbaasFamily::MongoDB),
            _ => None,
        }
    }

    pub fn dbaas_type(self) -> String {
        format!("{}-dbaas", self.provider())
    }

    pub fn single_type(self) -> String {
        format!("{}-single", self.provider())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_dbaas_family_has_both_catalogue_entries() {
        for family in &[DbaasFamily::MariaDB, DbaasFamily::PostgreSQL, DbaasFamily::MongoDB] {
            let dbaas = lookup(&family.dbaas_type()).expect("missing dbaas type");
            assert!(!dbaas.deployment);
            let single = lookup(&family.single_type()).expect("missing single type");
            assert!(single.persistent.is_some());
        }
    }

    #[test]
    fn legacy_types_are_remapped() {
        assert_eq!("mariadb-dbaas", remap_legacy("mariadb-shared"));
        assert_eq!("mongodb-dbaas", remap_legacy("mongo-shared"));
        assert_eq!("nginx", remap_legacy("nginx"));
        assert_eq!(Some(DbaasFamily::MongoDB), DbaasFamily::for_type("mongo"));
        assert_eq!(None, DbaasFamily::for_type("mariadb-single"));
    }

    #[test]
    fn linked_types_declare_their_secondary_container() {
        assert_eq!(Some("php"), lookup("nginx-php-persistent").unwrap().secondary_container);
        assert_eq!(None, lookup("nginx").unwrap().secondary_container);
    }
}
