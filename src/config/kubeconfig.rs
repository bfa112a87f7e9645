//! Reaching the api server from outside of a pod, through the current context of a kubeconfig
//! file. Only bearer tokens and client certificates are supported as credentials.
use super::{CAData, ClientConfig, Credentials};

use std::fmt::{self, Display};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum KubeConfigError {
    Io(PathBuf, io::Error),
    Format(PathBuf, serde_yaml::Error),
    NoHomeDir,
    /// The current context points at a cluster, user or context that isn't in the file
    MissingEntry { section: &'static str, name: String },
    /// The user of the current context has no token and no complete client certificate
    UnsupportedCredentials(String),
}

impl Display for KubeConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KubeConfigError::Io(path, err) => {
                write!(f, "failed to read kubeconfig '{}': {}", path.display(), err)
            }
            KubeConfigError::Format(path, err) => {
                write!(f, "invalid kubeconfig '{}': {}", path.display(), err)
            }
            KubeConfigError::NoHomeDir => {
                f.write_str("KUBECONFIG is not set and there's no home directory to look in")
            }
            KubeConfigError::MissingEntry { section, name } => {
                write!(f, "kubeconfig has no {} named '{}'", section, name)
            }
            KubeConfigError::UnsupportedCredentials(user) => write!(
                f,
                "kubeconfig user '{}' needs a token or a client certificate and key",
                user
            ),
        }
    }
}

impl std::error::Error for KubeConfigError {}

/// An entry of the `clusters`, `users` or `contexts` list. The key of the payload is named after
/// the list.
#[derive(Deserialize, Debug, Clone, PartialEq)]
struct Named<T> {
    name: String,
    #[serde(alias = "cluster", alias = "user", alias = "context")]
    entry: T,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    server: String,
    certificate_authority: Option<PathBuf>,
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
struct UserEntry {
    token: Option<String>,
    client_certificate: Option<PathBuf>,
    client_key: Option<PathBuf>,
    client_certificate_data: Option<String>,
    client_key_data: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
struct ContextEntry {
    cluster: String,
    user: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct KubeConfig {
    #[serde(rename = "current-context")]
    current_context: String,
    #[serde(default)]
    clusters: Vec<Named<ClusterEntry>>,
    #[serde(default)]
    users: Vec<Named<UserEntry>>,
    #[serde(default)]
    contexts: Vec<Named<ContextEntry>>,
}

fn find<'a, T>(
    entries: &'a [Named<T>],
    section: &'static str,
    name: &str,
) -> Result<&'a T, KubeConfigError> {
    entries
        .iter()
        .find(|named| named.name == name)
        .map(|named| &named.entry)
        .ok_or_else(|| KubeConfigError::MissingEntry {
            section,
            name: name.to_owned(),
        })
}

/// `$KUBECONFIG`, or `~/.kube/config`
fn kubeconfig_path() -> Result<PathBuf, KubeConfigError> {
    if let Some(path) = std::env::var_os("KUBECONFIG").filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::home_dir()
        .map(|home| home.join(".kube").join("config"))
        .ok_or(KubeConfigError::NoHomeDir)
}

/// Resolves paths in the file relative to the directory it lives in
fn resolve(dir: &Path, path: &Path) -> String {
    dir.join(path).to_string_lossy().into_owned()
}

impl KubeConfig {
    pub fn load_file(path: &Path) -> Result<KubeConfig, KubeConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|e| KubeConfigError::Io(path.to_owned(), e))?;
        serde_yaml::from_str(&contents).map_err(|e| KubeConfigError::Format(path.to_owned(), e))
    }

    /// The connection for the current context. Relative certificate paths are resolved against
    /// `dir`.
    pub fn client_config(
        &self,
        user_agent: String,
        dir: &Path,
    ) -> Result<ClientConfig, KubeConfigError> {
        let context = find(&self.contexts, "context", &self.current_context)?;
        let cluster = find(&self.clusters, "cluster", &context.cluster)?;
        let user = find(&self.users, "user", &context.user)?;
        log::debug!(
            "using kubeconfig context '{}' (cluster '{}', user '{}')",
            self.current_context,
            context.cluster,
            context.user
        );

        let credentials = if let Some(token) = user.token.as_ref() {
            Credentials::bearer_token(token)
        } else if let (Some(cert), Some(key)) =
            (&user.client_certificate_data, &user.client_key_data)
        {
            Credentials::Pem {
                certificate_base64: cert.clone(),
                private_key_base64: key.clone(),
            }
        } else if let (Some(cert), Some(key)) = (&user.client_certificate, &user.client_key) {
            Credentials::PemPath {
                certificate_path: resolve(dir, cert),
                private_key_path: resolve(dir, key),
            }
        } else {
            return Err(KubeConfigError::UnsupportedCredentials(context.user.clone()));
        };

        let ca_data = match (&cluster.certificate_authority_data, &cluster.certificate_authority) {
            (Some(data), _) => Some(CAData::Contents(data.clone())),
            (None, Some(path)) => Some(CAData::File(resolve(dir, path))),
            (None, None) => None,
        };

        Ok(ClientConfig {
            api_server_endpoint: cluster.server.clone(),
            credentials,
            ca_data,
            verify_ssl_certs: !cluster.insecure_skip_tls_verify,
            user_agent,
        })
    }
}

pub(crate) fn load_from_kubeconfig(user_agent: String) -> Result<ClientConfig, KubeConfigError> {
    let path = kubeconfig_path()?;
    let kubeconfig = KubeConfig::load_file(&path)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    kubeconfig.client_config(user_agent, dir)
}

#[cfg(test)]
mod test {
    use super::*;

    const KUBECONFIG: &str = r#"
current-context: lagoon-remote
clusters:
  - name: remote
    cluster:
      server: https://remote.example.com:6443
      certificate-authority: ca.crt
contexts:
  - name: lagoon-remote
    context:
      cluster: remote
      user: deployer
users:
  - name: deployer
    user:
      token: abc123
  - name: admin
    user:
      client-certificate: certs/admin.crt
      client-key: certs/admin.key
"#;

    fn kubeconfig(yaml: &str) -> KubeConfig {
        serde_yaml::from_str(yaml).expect("invalid yaml")
    }

    #[test]
    fn resolves_relative_ca_file_and_token() {
        let config = kubeconfig(KUBECONFIG)
            .client_config("lagoon-build".to_owned(), Path::new("/home/deployer/.kube"))
            .expect("failed to create client config");

        assert_eq!("https://remote.example.com:6443", config.api_server_endpoint);
        assert_eq!(
            Some(CAData::File("/home/deployer/.kube/ca.crt".to_owned())),
            config.ca_data
        );
        assert_eq!(Some("Bearer abc123"), config.credentials.header_value());
        assert!(config.verify_ssl_certs);
    }

    #[test]
    fn client_certificate_paths_are_resolved() {
        let yaml = KUBECONFIG.replace("user: deployer", "user: admin");
        let config = kubeconfig(&yaml)
            .client_config("lagoon-build".to_owned(), Path::new("/kube"))
            .expect("failed to create client config");
        assert_eq!(
            Credentials::PemPath {
                certificate_path: "/kube/certs/admin.crt".to_owned(),
                private_key_path: "/kube/certs/admin.key".to_owned(),
            },
            config.credentials
        );
    }

    #[test]
    fn certificate_without_key_is_unsupported() {
        let yaml = KUBECONFIG
            .replace("user: deployer", "user: admin")
            .replace("      client-key: certs/admin.key\n", "");
        let err = kubeconfig(&yaml)
            .client_config("lagoon-build".to_owned(), Path::new("/kube"))
            .unwrap_err();
        assert!(err.to_string().contains("'admin'"));
    }

    #[test]
    fn missing_context_is_an_error() {
        let yaml = KUBECONFIG.replace("current-context: lagoon-remote", "current-context: nope");
        let result = kubeconfig(&yaml).client_config("lagoon-build".to_owned(), Path::new("/"));
        match result {
            Err(KubeConfigError::MissingEntry { section, name }) => {
                assert_eq!("context", section);
                assert_eq!("nope", name);
            }
            other => panic!("expected missing context error, got: {:?}", other),
        }
    }
}
