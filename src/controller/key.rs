//! # Multi-Cluster Keys
//!
//! Addressing scheme for every watched object across member clusters.
//!
//! A key carries the operation that produced it plus the object's identity:
//!
//! ```text
//! ADD/Route/cluster1/ns1/route1
//! UPDATE/LBSvc/cluster2/ns1/svc1
//! DELETE/Ingress/cluster1/ns1/app1/host1.example.com
//! ```
//!
//! Ingress keys carry one extra trailing segment because a single ingress can
//! expose several virtual hosts, each tracked as an independent member. When
//! the parts of an ingress key are reported back to callers, the name and
//! hostname are recombined as `name/hostname`.

use crate::constants::{INGRESS_MULTI_CLUSTER_KEY_LEN, MULTI_CLUSTER_KEY_LEN};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DELIMITER: char = '/';

/// Format errors for keys and composite names. These are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("multi-cluster key is empty")]
    Empty,
    #[error("unknown operation '{0}' in multi-cluster key")]
    UnknownOperation(String),
    #[error("unknown object type '{0}' in multi-cluster key")]
    UnknownObjectType(String),
    #[error("multi-cluster key '{key}' has {found} segments, expected {expected}")]
    SegmentCount {
        key: String,
        found: usize,
        expected: usize,
    },
    #[error("multi-cluster route/svc name is empty")]
    EmptyObjectName,
    #[error("multi-cluster route/svc name format is unexpected: '{0}'")]
    ObjectNameFormat(String),
    #[error("multi-cluster ingress host name is empty")]
    EmptyIngressHostName,
    #[error("multi-cluster ingress name format is unexpected: '{0}'")]
    IngressHostNameFormat(String),
    #[error("multi-cluster namespace is empty")]
    EmptyNamespace,
    #[error("multi-cluster namespace format is unexpected: '{0}'")]
    NamespaceFormat(String),
}

/// Operation that produced a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Update,
    Delete,
}

impl Operation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "ADD",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(Operation::Add),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(KeyError::UnknownOperation(other.to_string())),
        }
    }
}

/// Watched object kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    Route,
    Ingress,
    /// Service of type LoadBalancer
    Service,
}

impl ObjectType {
    pub const ALL: [ObjectType; 3] = [ObjectType::Route, ObjectType::Ingress, ObjectType::Service];

    /// Wire name used inside keys
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Route => "Route",
            ObjectType::Ingress => "Ingress",
            ObjectType::Service => "LBSvc",
        }
    }

    /// Number of `/` separated segments a key of this type has
    #[must_use]
    pub fn key_segments(&self) -> usize {
        match self {
            ObjectType::Ingress => INGRESS_MULTI_CLUSTER_KEY_LEN,
            ObjectType::Route | ObjectType::Service => MULTI_CLUSTER_KEY_LEN,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for ObjectType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Route" => Ok(ObjectType::Route),
            "Ingress" => Ok(ObjectType::Ingress),
            "LBSvc" => Ok(ObjectType::Service),
            other => Err(KeyError::UnknownObjectType(other.to_string())),
        }
    }
}

/// Identity of a route or service in one member cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterObject {
    pub cluster: String,
    pub namespace: String,
    pub name: String,
}

/// Identity of one virtual host of an ingress in one member cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IngressHost {
    pub cluster: String,
    pub namespace: String,
    pub name: String,
    pub hostname: String,
}

/// Object identity tagged by type; each variant carries exactly the fields it needs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    Route(ClusterObject),
    Service(ClusterObject),
    Ingress(IngressHost),
}

impl ObjectRef {
    #[must_use]
    pub fn route(cluster: &str, namespace: &str, name: &str) -> Self {
        ObjectRef::Route(ClusterObject {
            cluster: cluster.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn service(cluster: &str, namespace: &str, name: &str) -> Self {
        ObjectRef::Service(ClusterObject {
            cluster: cluster.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn ingress(cluster: &str, namespace: &str, name: &str, hostname: &str) -> Self {
        ObjectRef::Ingress(IngressHost {
            cluster: cluster.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            hostname: hostname.to_string(),
        })
    }

    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectRef::Route(_) => ObjectType::Route,
            ObjectRef::Service(_) => ObjectType::Service,
            ObjectRef::Ingress(_) => ObjectType::Ingress,
        }
    }

    #[must_use]
    pub fn cluster(&self) -> &str {
        match self {
            ObjectRef::Route(o) | ObjectRef::Service(o) => &o.cluster,
            ObjectRef::Ingress(i) => &i.cluster,
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            ObjectRef::Route(o) | ObjectRef::Service(o) => &o.namespace,
            ObjectRef::Ingress(i) => &i.namespace,
        }
    }

    /// Resource name without the ingress hostname
    #[must_use]
    pub fn resource_name(&self) -> &str {
        match self {
            ObjectRef::Route(o) | ObjectRef::Service(o) => &o.name,
            ObjectRef::Ingress(i) => &i.name,
        }
    }

    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        match self {
            ObjectRef::Ingress(i) => Some(&i.hostname),
            ObjectRef::Route(_) | ObjectRef::Service(_) => None,
        }
    }

    /// Name as reported to callers: `name`, or `name/hostname` for ingress hosts
    #[must_use]
    pub fn compound_name(&self) -> String {
        match self {
            ObjectRef::Route(o) | ObjectRef::Service(o) => o.name.clone(),
            ObjectRef::Ingress(i) => format!("{}/{}", i.name, i.hostname),
        }
    }

    /// Per-cluster store key: `namespace/name` or `namespace/name/hostname`
    #[must_use]
    pub fn store_key(&self) -> String {
        format!("{}/{}", self.namespace(), self.compound_name())
    }

    /// Cluster-qualified identity: `cluster/namespace/name[/hostname]`
    #[must_use]
    pub fn cluster_object_name(&self) -> String {
        format!("{}/{}", self.cluster(), self.store_key())
    }
}

/// A watched object's identity plus the operation that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MultiClusterKey {
    pub operation: Operation,
    pub object: ObjectRef,
}

/// Decoded key fields in the caller-facing layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParts {
    pub operation: Operation,
    pub object_type: ObjectType,
    pub cluster: String,
    pub namespace: String,
    /// `name`, or `name/hostname` for ingress hosts
    pub name: String,
}

impl MultiClusterKey {
    #[must_use]
    pub fn new(operation: Operation, object: ObjectRef) -> Self {
        Self { operation, object }
    }

    /// Serialize into the `/` delimited wire format
    #[must_use]
    pub fn encode(&self) -> String {
        let op = self.operation.as_str();
        let ty = self.object.object_type().as_str();
        match &self.object {
            ObjectRef::Route(o) | ObjectRef::Service(o) => {
                format!("{op}/{ty}/{}/{}/{}", o.cluster, o.namespace, o.name)
            }
            ObjectRef::Ingress(i) => format!(
                "{op}/{ty}/{}/{}/{}/{}",
                i.cluster, i.namespace, i.name, i.hostname
            ),
        }
    }

    /// Parse the wire format. Only the segment count is validated against the
    /// declared object type; cluster and namespace existence is the caller's concern.
    pub fn decode(key: &str) -> Result<Self, KeyError> {
        if key.is_empty() {
            return Err(KeyError::Empty);
        }
        let segments: Vec<&str> = key.split(DELIMITER).collect();
        if segments.len() < 2 {
            return Err(KeyError::SegmentCount {
                key: key.to_string(),
                found: segments.len(),
                expected: MULTI_CLUSTER_KEY_LEN,
            });
        }
        let operation: Operation = segments[0].parse()?;
        let object_type: ObjectType = segments[1].parse()?;
        let expected = object_type.key_segments();
        if segments.len() != expected {
            return Err(KeyError::SegmentCount {
                key: key.to_string(),
                found: segments.len(),
                expected,
            });
        }

        let object = match object_type {
            ObjectType::Route => ObjectRef::route(segments[2], segments[3], segments[4]),
            ObjectType::Service => ObjectRef::service(segments[2], segments[3], segments[4]),
            ObjectType::Ingress => {
                ObjectRef::ingress(segments[2], segments[3], segments[4], segments[5])
            }
        };
        Ok(Self { operation, object })
    }

    #[must_use]
    pub fn parts(&self) -> KeyParts {
        KeyParts {
            operation: self.operation,
            object_type: self.object.object_type(),
            cluster: self.object.cluster().to_string(),
            namespace: self.object.namespace().to_string(),
            name: self.object.compound_name(),
        }
    }
}

impl fmt::Display for MultiClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for MultiClusterKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Split `cluster/namespace/name`
pub fn split_cluster_object_name(name: &str) -> Result<(String, String, String), KeyError> {
    if name.is_empty() {
        return Err(KeyError::EmptyObjectName);
    }
    match name.split(DELIMITER).collect::<Vec<_>>().as_slice() {
        [cluster, namespace, obj] => {
            Ok(((*cluster).to_string(), (*namespace).to_string(), (*obj).to_string()))
        }
        _ => Err(KeyError::ObjectNameFormat(name.to_string())),
    }
}

/// Split `cluster/namespace/name/hostname`
pub fn split_cluster_ingress_host_name(
    name: &str,
) -> Result<(String, String, String, String), KeyError> {
    if name.is_empty() {
        return Err(KeyError::EmptyIngressHostName);
    }
    match name.split(DELIMITER).collect::<Vec<_>>().as_slice() {
        [cluster, namespace, obj, host] => Ok((
            (*cluster).to_string(),
            (*namespace).to_string(),
            (*obj).to_string(),
            (*host).to_string(),
        )),
        _ => Err(KeyError::IngressHostNameFormat(name.to_string())),
    }
}

/// Split `cluster/namespace`
pub fn split_cluster_namespace(name: &str) -> Result<(String, String), KeyError> {
    if name.is_empty() {
        return Err(KeyError::EmptyNamespace);
    }
    match name.split(DELIMITER).collect::<Vec<_>>().as_slice() {
        [cluster, namespace] => Ok(((*cluster).to_string(), (*namespace).to_string())),
        _ => Err(KeyError::NamespaceFormat(name.to_string())),
    }
}
