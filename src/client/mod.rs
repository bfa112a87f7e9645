//! A minimal client for the Kubernetes api server. The build only ever needs to list labeled
//! resources in a single namespace and delete them, so that's all this supports.
mod request;

use crate::config::{CAData, ClientConfig, Credentials};
use crate::k8s_types::K8sType;
use crate::resource::{K8sResource, ObjectIdRef};

use async_trait::async_trait;
use bytes::Buf;
use http::{Request, Response};
use hyper::client::Client as HyperClient;
use hyper::client::HttpConnector;
use hyper::Body;
use hyper_openssl::HttpsConnector;
use openssl::pkey::PKey;
use openssl::ssl::{SslConnector, SslMethod};
use openssl::x509::X509;
use serde::de::DeserializeOwned;

use std::fs;
use std::io;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub enum Error {
    Io(hyper::Error),
    Serde(serde_json::Error),
    Http(http::StatusCode),
    Api(ApiError),
    Request(http::Error),
    Url(url::ParseError),
    InvalidEndpoint(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e as &(dyn std::error::Error + 'static)),
            Error::Serde(e) => Some(e as &(dyn std::error::Error + 'static)),
            Error::Request(e) => Some(e as &(dyn std::error::Error + 'static)),
            Error::Url(e) => Some(e as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl Error {
    pub fn http(status: http::StatusCode) -> Error {
        Error::Http(status)
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Http(ref status) => Some(status.as_u16()),
            Error::Api(ref api_error) => Some(api_error.code),
            _ => None,
        }
    }

    pub fn is_http_status(&self, code: u16) -> bool {
        self.status_code() == Some(code)
    }

    /// The api server answers a list request for a resource type it doesn't know about (an
    /// uninstalled CRD) with a 404
    pub fn is_not_found(&self) -> bool {
        self.is_http_status(404)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "Io Error: {}", e),
            Error::Serde(ref e) => write!(f, "(De)Serialization error: {}", e),
            Error::Http(ref e) => write!(f, "Http Error: {}", e),
            Error::Api(ref e) => write!(f, "{}", e),
            Error::Request(ref e) => write!(f, "Invalid request: {}", e),
            Error::Url(ref e) => write!(f, "Invalid url: {}", e),
            Error::InvalidEndpoint(ref endpoint) => {
                write!(f, "Invalid api server endpoint: '{}'", endpoint)
            }
        }
    }
}

impl From<hyper::Error> for Error {
    fn from(e: hyper::Error) -> Error {
        Error::Io(e)
    }
}
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Serde(e)
    }
}
impl From<http::Error> for Error {
    fn from(e: http::Error) -> Error {
        Error::Request(e)
    }
}
impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Error {
        Error::Url(e)
    }
}

/// The subset of the Kubernetes api that the collector and cleanup depend on. Implemented by
/// `Client` for real clusters, and by an in-memory fake in the testkit.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Lists all resources of the given type in the namespace that match the label selector
    async fn list(
        &self,
        k8s_type: &'static K8sType,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<K8sResource>, Error>;

    /// Deletes the resource. Deleting something that is already gone is not an error.
    async fn delete(&self, k8s_type: &'static K8sType, id: &ObjectIdRef<'_>) -> Result<(), Error>;
}

#[derive(Debug)]
struct ClientInner {
    http_client: HyperClient<HttpsConnector<HttpConnector>>,
    config: ClientConfig,
}

#[derive(Debug, Clone)]
pub struct Client(Arc<ClientInner>);

impl Client {
    pub fn new(mut config: ClientConfig) -> Result<Client, io::Error> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);

        let mut ssl = SslConnector::builder(SslMethod::tls())?;
        // enable http2 using alpn
        ssl.set_alpn_protos(b"\x02h2\x08http/1.1")?;
        match config.ca_data.take() {
            Some(CAData::Contents(certs)) => {
                // inline CA data from a kubeconfig needs to be decoded and added to the cert store manually
                let decoded = base64::decode(&certs).map_err(|err| {
                    io::Error::new(
                        io::ErrorKind::Other,
                        format!(
                            "Invalid base64 content of certificate-authority-data: {}",
                            err
                        ),
                    )
                })?;
                let certs = X509::stack_from_pem(decoded.as_slice())?;
                let cert_store = ssl.cert_store_mut();
                for cert in certs {
                    cert_store.add_cert(cert)?;
                }
            }
            Some(CAData::File(path)) => {
                ssl.set_ca_file(path.as_str())?;
            }
            None => {}
        }

        match config.credentials {
            Credentials::PemPath {
                ref certificate_path,
                ref private_key_path,
            } => {
                let cert = X509::from_pem(fs::read(certificate_path)?.as_slice())?;
                let pkey = PKey::private_key_from_pem(fs::read(private_key_path)?.as_slice())?;
                ssl.set_certificate(&cert)?;
                ssl.set_private_key(&pkey)?;
                ssl.check_private_key()?;
            }
            Credentials::Pem {
                ref certificate_base64,
                ref private_key_base64,
            } => {
                let decoded_cert = decode_pem("client-certificate-data", certificate_base64)?;
                let decoded_key = decode_pem("client-key-data", private_key_base64)?;
                let cert = X509::from_pem(decoded_cert.as_slice())?;
                let pkey = PKey::private_key_from_pem(decoded_key.as_slice())?;
                ssl.set_certificate(&cert)?;
                ssl.set_private_key(&pkey)?;
                ssl.check_private_key()?;
            }
            Credentials::Header(_) => {}
        }

        if config.verify_ssl_certs {
            ssl.set_verify(openssl::ssl::SslVerifyMode::PEER);
        } else {
            log::warn!("TLS Certificate verification has been disabled! All connections to the Kubernetes api server will be insecure!");
            ssl.set_verify(openssl::ssl::SslVerifyMode::NONE);
        }

        let https = HttpsConnector::with_connector(http, ssl)?;
        let client = HyperClient::builder().build(https);

        Ok(Client(Arc::new(ClientInner {
            http_client: client,
            config,
        })))
    }

    pub async fn list_all(
        &self,
        k8s_type: &K8sType,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<ObjectList<K8sResource>, Error> {
        let req = request::list_request(&self.0.config, k8s_type, label_selector, namespace)?;
        self.get_response_body(req).await
    }

    pub async fn delete_resource(
        &self,
        k8s_type: &K8sType,
        id: &ObjectIdRef<'_>,
    ) -> Result<(), Error> {
        log::info!("Deleting resource '{}' with type: {}", id, k8s_type);
        let req = request::delete_request(&self.0.config, k8s_type, id)?;
        let response = self.get_response(req).await?;

        match response.status().as_u16() {
            200..=299 | 404 | 409 => {
                // 404 means that something else must have already deleted the resource, and
                // 409 means that it's already in the process of being deleted
                Ok(())
            }
            other => {
                log::error!(
                    "Delete request for {} : {} failed with status: {}",
                    k8s_type,
                    id,
                    other
                );
                Err(Client::read_error(response).await)
            }
        }
    }

    async fn get_response(&self, req: Request<Body>) -> Result<Response<Body>, Error> {
        let method = req.method().to_string();
        let uri = req.uri().to_string();
        let start_time = Instant::now();
        log::debug!("Starting {} request to: {}", method, uri);

        let result = self.0.http_client.request(req).await;
        let duration = start_time.elapsed().as_millis();
        match result {
            Ok(resp) => {
                log::debug!(
                    "Response status received for {} to: {}, status: {}, duration: {}ms",
                    method,
                    uri,
                    resp.status().as_u16(),
                    duration
                );
                Ok(resp)
            }
            Err(err) => {
                log::error!(
                    "Failed to execute {} request to: {}, err: {}",
                    method,
                    uri,
                    err
                );
                Err(err.into())
            }
        }
    }

    async fn get_response_body<T: DeserializeOwned>(&self, req: Request<Body>) -> Result<T, Error> {
        let response = self.get_response(req).await?;
        if !response.status().is_success() {
            return Err(Client::read_error(response).await);
        }

        let deserialized = if log::log_enabled!(log::Level::Trace) {
            // reading the body twice isn't possible, so buffer it all when we need to log it
            let body = hyper::body::to_bytes(response.into_body()).await?;
            log::trace!("Got response body: {}", String::from_utf8_lossy(body.as_ref()));
            serde_json::from_slice(body.as_ref())?
        } else {
            let body = hyper::body::aggregate(response.into_body()).await?;
            serde_json::from_reader(body.reader())?
        };
        Ok(deserialized)
    }

    /// Turns an unsuccessful response into an error, preferring the api server's own `Status`
    /// object when the body contains one
    async fn read_error(response: Response<Body>) -> Error {
        let status = response.status();
        match hyper::body::to_bytes(response.into_body()).await {
            Ok(body) => match serde_json::from_slice::<ApiError>(body.as_ref()) {
                Ok(api_error) => {
                    log::debug!("Api server returned status: {}", api_error);
                    Error::Api(api_error)
                }
                Err(_) => {
                    log::debug!(
                        "Response status: {}, body: {}",
                        status,
                        String::from_utf8_lossy(body.as_ref())
                    );
                    Error::http(status)
                }
            },
            Err(_) => Error::http(status),
        }
    }
}

fn decode_pem(field: &str, value: &str) -> Result<Vec<u8>, io::Error> {
    base64::decode(value).map_err(|err| {
        io::Error::new(
            io::ErrorKind::Other,
            format!("Invalid base64 content of {}: {}", field, err),
        )
    })
}

#[async_trait]
impl ClusterApi for Client {
    async fn list(
        &self,
        k8s_type: &'static K8sType,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<K8sResource>, Error> {
        let list = self
            .list_all(k8s_type, Some(namespace), Some(label_selector))
            .await?;
        Ok(list.items)
    }

    async fn delete(&self, k8s_type: &'static K8sType, id: &ObjectIdRef<'_>) -> Result<(), Error> {
        self.delete_resource(k8s_type, id).await
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
pub struct ApiError {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: String,
    pub code: u16,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> ApiError {
        ApiError {
            status: "Failure".to_owned(),
            message: message.into(),
            reason: "NotFound".to_owned(),
            code: 404,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Api Error: status: '{}', code: {}, reason: '{}', message: '{}'",
            self.status, self.code, self.reason, self.message
        )
    }
}
impl std::error::Error for ApiError {}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ListMeta {
    #[serde(rename = "resourceVersion")]
    pub resource_version: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ObjectList<T> {
    pub metadata: ListMeta,
    pub items: Vec<T>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn api_status_is_parsed_as_not_found() {
        let body = r#"{
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": "the server could not find the requested resource",
            "reason": "NotFound",
            "code": 404
        }"#;
        let api_error: ApiError = serde_json::from_str(body).expect("failed to parse status");
        let err = Error::Api(api_error);
        assert!(err.is_not_found());
        assert!(Error::http(http::StatusCode::NOT_FOUND).is_not_found());
        assert!(!Error::http(http::StatusCode::FORBIDDEN).is_not_found());
    }

    #[test]
    fn object_list_deserializes_items() {
        let body = r#"{
            "metadata": {"resourceVersion": "123"},
            "items": [
                {"metadata": {"name": "nginx", "namespace": "example-main"}}
            ]
        }"#;
        let list: ObjectList<K8sResource> = serde_json::from_str(body).expect("invalid list");
        assert_eq!(1, list.items.len());
        assert_eq!("nginx", list.items[0].name());
        assert_eq!(Some("123".to_owned()), list.metadata.resource_version);
    }
}
