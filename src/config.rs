//! Configuration for talking to the cluster, and the immutable snapshot of the build-pod
//! environment that every resolver reads from.
mod build_env;
mod kubeconfig;

pub use self::build_env::BuildEnv;
pub(crate) use self::build_env::{parse_bool, parse_truthy};
pub use self::kubeconfig::{KubeConfig, KubeConfigError};

use std::io::{self, Read};
use std::fs::File;
use std::path::Path;

const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const SERVICE_ACCOUNT_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
const SERVICE_ACCOUNT_NAMESPACE_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";
const API_SERVER_HOSTNAME: &str = "kubernetes.default.svc";

/// Where to find the certificate authority used to verify the api server
#[derive(Debug, Clone, PartialEq)]
pub enum CAData {
    /// Path to a PEM file
    File(String),
    /// Base64 encoded PEM contents, as they appear in a kubeconfig file
    Contents(String),
}

/// Credentials used to authenticate with the api server
#[derive(Clone, PartialEq)]
pub enum Credentials {
    /// The complete value of the `Authorization` header
    Header(String),
    /// Base64 encoded client certificate and private key
    Pem {
        certificate_base64: String,
        private_key_base64: String,
    },
    /// Paths to a client certificate and private key
    PemPath {
        certificate_path: String,
        private_key_path: String,
    },
}

impl Credentials {
    pub fn bearer_token(token: impl AsRef<str>) -> Credentials {
        Credentials::Header(format!("Bearer {}", token.as_ref().trim()))
    }

    pub(crate) fn header_value(&self) -> Option<&str> {
        match self {
            Credentials::Header(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

// never print tokens or keys
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Credentials::Header(_) => f.write_str("Credentials::Header(<redacted>)"),
            Credentials::Pem { .. } => f.write_str("Credentials::Pem(<redacted>)"),
            Credentials::PemPath {
                certificate_path, ..
            } => write!(f, "Credentials::PemPath({})", certificate_path),
        }
    }
}

/// Everything the cluster client needs to connect to the api server
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_server_endpoint: String,
    pub credentials: Credentials,
    pub ca_data: Option<CAData>,
    pub verify_ssl_certs: bool,
    pub user_agent: String,
}

impl ClientConfig {
    /// Loads the configuration from the service account that is mounted into every pod, which is
    /// how the build pod normally runs.
    pub fn from_service_account(user_agent: impl Into<String>) -> Result<ClientConfig, io::Error> {
        let mut token_file = File::open(SERVICE_ACCOUNT_TOKEN_PATH)?;
        let mut service_account_token = String::new();
        token_file.read_to_string(&mut service_account_token)?;

        let ca_data = if Path::new(SERVICE_ACCOUNT_CA_PATH).exists() {
            Some(CAData::File(SERVICE_ACCOUNT_CA_PATH.to_owned()))
        } else {
            None
        };

        let api_server_endpoint = format!("https://{}", API_SERVER_HOSTNAME);
        Ok(ClientConfig {
            api_server_endpoint,
            credentials: Credentials::bearer_token(service_account_token),
            ca_data,
            verify_ssl_certs: true,
            user_agent: user_agent.into(),
        })
    }

    /// Loads the configuration from the kubeconfig file at `$KUBECONFIG`, or `~/.kube/config`
    pub fn from_kubeconfig(user_agent: impl Into<String>) -> Result<ClientConfig, KubeConfigError> {
        self::kubeconfig::load_from_kubeconfig(user_agent.into())
    }

    /// Tries the service account first, and falls back to the kubeconfig file
    pub fn detect(user_agent: &str) -> Result<ClientConfig, KubeConfigError> {
        ClientConfig::from_service_account(user_agent).or_else(|err| {
            log::debug!(
                "Failed to load ClientConfig from service account ({}), so trying to load from kubeconfig",
                err
            );
            ClientConfig::from_kubeconfig(user_agent)
        })
    }
}

/// Returns the namespace of the service account, if we're running inside a pod
pub fn service_account_namespace() -> Option<String> {
    std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE_PATH)
        .ok()
        .map(|ns| ns.trim().to_owned())
        .filter(|ns| !ns.is_empty())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bearer_token_is_trimmed() {
        let creds = Credentials::bearer_token("abc123\n");
        assert_eq!(Some("Bearer abc123"), creds.header_value());
    }

    #[test]
    fn debug_output_does_not_leak_credentials() {
        let creds = Credentials::bearer_token("very-secret");
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("very-secret"));
    }
}
