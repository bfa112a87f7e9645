mod object_id;

pub use self::object_id::{ObjectId, ObjectIdRef};

use serde_json::Value;

pub type JsonObject = serde_json::Map<String, Value>;

pub static NAMESPACE_POINTER: &str = "/metadata/namespace";
pub static NAME_POINTER: &str = "/metadata/name";
pub static LABELS_POINTER: &str = "/metadata/labels";

#[derive(Debug, PartialEq, Clone)]
pub struct InvalidResourceError {
    pub message: &'static str,
    pub value: Value,
}

impl InvalidResourceError {
    pub fn new(message: &'static str, value: Value) -> Self {
        InvalidResourceError { message, value }
    }
}

impl std::fmt::Display for InvalidResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Invalid Resource: {}", self.message)
    }
}

impl std::error::Error for InvalidResourceError {}

/// A Kubernetes object as returned by the api server or by a templating function. We only ever
/// look at a handful of fields, so the object is kept as raw json rather than being deserialized
/// into a typed struct.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct K8sResource(Value);

impl K8sResource {
    /// Wraps the value, as long as it has a `metadata.name`
    pub fn from_value(value: Value) -> Result<K8sResource, InvalidResourceError> {
        if value.pointer(NAME_POINTER).and_then(Value::as_str).is_none() {
            Err(InvalidResourceError::new("missing metadata.name", value))
        } else {
            Ok(K8sResource(value))
        }
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn name(&self) -> &str {
        // validated in from_value
        self.str_value(NAME_POINTER).unwrap_or("")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.str_value(NAMESPACE_POINTER)
    }

    pub fn get_object_id(&self) -> ObjectIdRef {
        ObjectIdRef::new(self.namespace().unwrap_or(""), self.name())
    }

    pub fn labels(&self) -> Option<&JsonObject> {
        self.0.pointer(LABELS_POINTER).and_then(Value::as_object)
    }

    pub fn get_label_value(&self, label: &str) -> Option<&str> {
        self.labels()?.get(label).and_then(Value::as_str)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels()
            .map(|labels| labels.contains_key(label))
            .unwrap_or(false)
    }

    pub fn str_value(&self, pointer: &str) -> Option<&str> {
        self.0.pointer(pointer).and_then(Value::as_str)
    }

    pub fn array_value(&self, pointer: &str) -> &[Value] {
        self.0
            .pointer(pointer)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl std::convert::AsRef<Value> for K8sResource {
    fn as_ref(&self) -> &Value {
        &self.0
    }
}

impl From<K8sResource> for Value {
    fn from(resource: K8sResource) -> Value {
        resource.into_value()
    }
}

impl std::fmt::Display for K8sResource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

pub fn str_value<'a, 'b>(json: &'a Value, pointer: &'b str) -> Option<&'a str> {
    json.pointer(pointer).and_then(Value::as_str)
}
