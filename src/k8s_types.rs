use std::fmt::{self, Display};
use std::hash::{self, Hash};

/// A basic description of a Kubernetes resource type, with just enough information to
/// communicate with the api server. We use `&'static str` for all of these so that it's easy
/// to pass references around without copying. Every type the collector and cleanup touch is
/// declared as a static below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct K8sType {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub plural_kind: &'static str,
}

impl Hash for K8sType {
    fn hash<H: hash::Hasher>(&self, hasher: &mut H) {
        self.api_version.hash(hasher);
        self.kind.hash(hasher);
    }
}

impl K8sType {
    pub fn as_group_and_version(&self) -> (&str, &str) {
        match self.api_version.find('/') {
            Some(slash_idx) => (
                &self.api_version[..slash_idx],
                &self.api_version[(slash_idx + 1)..],
            ),
            None => ("", self.api_version),
        }
    }

    pub fn group(&self) -> &str {
        self.as_group_and_version().0
    }

    pub fn version(&self) -> &str {
        self.as_group_and_version().1
    }

    /// Core types live under `/api`, everything else under `/apis/<group>`
    pub fn is_core(&self) -> bool {
        self.group().is_empty()
    }
}

impl Display for K8sType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.api_version, self.plural_kind)
    }
}

macro_rules! k8s_type {
    ($ref_name:ident, $api_version:expr, $kind:expr, $plural_kind:expr) => {
        #[allow(non_upper_case_globals)]
        pub static $ref_name: &crate::k8s_types::K8sType = &crate::k8s_types::K8sType {
            api_version: $api_version,
            kind: $kind,
            plural_kind: $plural_kind,
        };
    };
}

macro_rules! def_types {
    (@nogroupmod, $group:expr, [
        $( $version:ident => [
            $( $kind:ident ~ $plural_kind:ident ),*
        ]),*
    ]) => {
        $(
            pub mod $version {
                $(
                    k8s_type!($kind, concat!($group, "/", stringify!($version)), stringify!($kind), stringify!($plural_kind));
                )*
            }
        )*
    };
    ($group:ident => $rem:tt ) => {
        pub mod $group {
            def_types!{@nogroupmod, stringify!($group), $rem }
        }
    };
    (@core => [
        $( $version:ident => [
            $( $kind:ident ~ $plural_kind:ident ),*
        ]),*
    ]) => {
        pub mod core {
            $(pub mod $version {
                $(
                    k8s_type!($kind, stringify!($version), stringify!($kind), stringify!($plural_kind));
                )*
            })*
        }
    }
}

def_types! {
    @core => [
        v1 => [
            Service ~ services,
            Secret ~ secrets,
            PersistentVolumeClaim ~ persistentvolumeclaims
        ]
    ]
}

def_types! {
    apps => [
        v1 => [
            Deployment ~ deployments
        ]
    ]
}

def_types! {
    batch => [
        v1 => [
            CronJob ~ cronjobs
        ]
    ]
}

pub mod networking_k8s_io {
    def_types! {
        @nogroupmod, "networking.k8s.io", [
            v1 => [
                Ingress ~ ingresses,
                NetworkPolicy ~ networkpolicies
            ]
        ]
    }
}

/// K8up backup types, current api group
pub mod k8up_io {
    def_types! {
        @nogroupmod, "k8up.io", [
            v1 => [
                Schedule ~ schedules,
                PreBackupPod ~ prebackuppods
            ]
        ]
    }
}

/// K8up backup types, legacy api group
pub mod backup_appuio_ch {
    def_types! {
        @nogroupmod, "backup.appuio.ch", [
            v1alpha1 => [
                Schedule ~ schedules,
                PreBackupPod ~ prebackuppods
            ]
        ]
    }
}

pub mod mariadb_amazee_io {
    def_types! {
        @nogroupmod, "mariadb.amazee.io", [
            v1 => [
                MariaDBConsumer ~ mariadbconsumers
            ]
        ]
    }
}

pub mod mongodb_amazee_io {
    def_types! {
        @nogroupmod, "mongodb.amazee.io", [
            v1 => [
                MongoDBConsumer ~ mongodbconsumers
            ]
        ]
    }
}

pub mod postgres_amazee_io {
    def_types! {
        @nogroupmod, "postgres.amazee.io", [
            v1 => [
                PostgreSQLConsumer ~ postgresqlconsumers
            ]
        ]
    }
}
