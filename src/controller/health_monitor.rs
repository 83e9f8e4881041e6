//! # Health Monitor Naming
//!
//! Names are parsed back by downstream systems and must stay bit-exact:
//!
//! - path based: `amko--http--<gs>--<path>` / `amko--https--<gs>--<path>`
//! - non-path:   `amko--<gs>`

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const HM_PREFIX: &str = "amko";
const HM_DELIMITER: &str = "--";
const PATH_HM_SEGMENTS: usize = 4;
const NON_PATH_HM_SEGMENTS: usize = 2;

pub const HEALTH_MONITOR_TYPE_TCP: &str = "HEALTH_MONITOR_TCP";
pub const HEALTH_MONITOR_TYPE_UDP: &str = "HEALTH_MONITOR_UDP";
pub const HEALTH_MONITOR_TYPE_HTTP: &str = "HEALTH_MONITOR_HTTP";
pub const HEALTH_MONITOR_TYPE_HTTPS: &str = "HEALTH_MONITOR_HTTPS";

/// Shared TCP monitor for all passthrough routes
pub const PASSTHROUGH_HEALTH_MONITOR: &str = "amko--passthrough-hm-tcp";

pub const DEFAULT_TCP_HEALTH_MONITOR_PORT: i32 = 80;
pub const DEFAULT_HTTP_HEALTH_MONITOR_PORT: i32 = 80;
pub const DEFAULT_HTTPS_HEALTH_MONITOR_PORT: i32 = 443;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthMonitorNameError {
    #[error("hm name '{0}' is malformed, expected a path based hm")]
    NotPathBased(String),
    #[error("error in parsing gs name from hm '{0}', unexpected format")]
    UnexpectedFormat(String),
    #[error("unrecognized protocol '{0}'")]
    UnrecognizedProtocol(String),
}

/// Monitor type for a service protocol
pub fn hm_type_for_protocol(protocol: &str) -> Result<&'static str, HealthMonitorNameError> {
    match protocol {
        "TCP" => Ok(HEALTH_MONITOR_TYPE_TCP),
        "UDP" => Ok(HEALTH_MONITOR_TYPE_UDP),
        other => Err(HealthMonitorNameError::UnrecognizedProtocol(other.to_string())),
    }
}

#[must_use]
pub fn hm_type_for_tls(tls: bool) -> &'static str {
    if tls {
        HEALTH_MONITOR_TYPE_HTTPS
    } else {
        HEALTH_MONITOR_TYPE_HTTP
    }
}

#[must_use]
pub fn build_path_hm_name(gs_name: &str, path: &str, secure: bool) -> String {
    let scheme = if secure { "https" } else { "http" };
    format!("{HM_PREFIX}{HM_DELIMITER}{scheme}{HM_DELIMITER}{gs_name}{HM_DELIMITER}{path}")
}

#[must_use]
pub fn build_non_path_hm_name(gs_name: &str) -> String {
    format!("{HM_PREFIX}{HM_DELIMITER}{gs_name}")
}

/// Path of a path-based monitor name
pub fn path_from_hm_name(hm_name: &str) -> Result<String, HealthMonitorNameError> {
    let segments: Vec<&str> = hm_name.split(HM_DELIMITER).collect();
    if segments.len() != PATH_HM_SEGMENTS {
        tracing::error!(hm_name, "hm is malformed, expected a path based hm");
        return Err(HealthMonitorNameError::NotPathBased(hm_name.to_string()));
    }
    Ok(segments[3].to_string())
}

/// Global-service name a monitor was generated for
pub fn gs_name_from_hm_name(hm_name: &str) -> Result<String, HealthMonitorNameError> {
    let segments: Vec<&str> = hm_name.split(HM_DELIMITER).collect();
    match segments.len() {
        PATH_HM_SEGMENTS => Ok(segments[2].to_string()),
        NON_PATH_HM_SEGMENTS => Ok(segments[1].to_string()),
        _ => Err(HealthMonitorNameError::UnexpectedFormat(hm_name.to_string())),
    }
}

/// A parsed monitor name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthMonitorName {
    Path {
        secure: bool,
        gs_name: String,
        path: String,
    },
    NonPath {
        gs_name: String,
    },
}

impl HealthMonitorName {
    #[must_use]
    pub fn gs_name(&self) -> &str {
        match self {
            HealthMonitorName::Path { gs_name, .. } | HealthMonitorName::NonPath { gs_name } => {
                gs_name
            }
        }
    }
}

impl fmt::Display for HealthMonitorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthMonitorName::Path {
                secure,
                gs_name,
                path,
            } => f.write_str(&build_path_hm_name(gs_name, path, *secure)),
            HealthMonitorName::NonPath { gs_name } => f.write_str(&build_non_path_hm_name(gs_name)),
        }
    }
}

impl FromStr for HealthMonitorName {
    type Err = HealthMonitorNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unexpected = || HealthMonitorNameError::UnexpectedFormat(s.to_string());
        match s.split(HM_DELIMITER).collect::<Vec<_>>().as_slice() {
            [HM_PREFIX, scheme, gs_name, path] => {
                let secure = match *scheme {
                    "http" => false,
                    "https" => true,
                    _ => return Err(unexpected()),
                };
                Ok(HealthMonitorName::Path {
                    secure,
                    gs_name: (*gs_name).to_string(),
                    path: (*path).to_string(),
                })
            }
            [HM_PREFIX, gs_name] => Ok(HealthMonitorName::NonPath {
                gs_name: (*gs_name).to_string(),
            }),
            _ => Err(unexpected()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_hm_names_round_trip() {
        let http = build_path_hm_name("foo.avi.com", "/bar", false);
        assert_eq!(http, "amko--http--foo.avi.com--/bar");
        let https = build_path_hm_name("foo.avi.com", "/bar", true);
        assert_eq!(https, "amko--https--foo.avi.com--/bar");

        assert_eq!(gs_name_from_hm_name(&https).unwrap(), "foo.avi.com");
        assert_eq!(path_from_hm_name(&http).unwrap(), "/bar");
        assert_eq!(
            https.parse::<HealthMonitorName>().unwrap(),
            HealthMonitorName::Path {
                secure: true,
                gs_name: "foo.avi.com".to_string(),
                path: "/bar".to_string()
            }
        );
    }

    #[test]
    fn test_non_path_hm_name() {
        let name = build_non_path_hm_name("foo.avi.com");
        assert_eq!(name, "amko--foo.avi.com");
        assert_eq!(gs_name_from_hm_name(&name).unwrap(), "foo.avi.com");
        assert!(path_from_hm_name(&name).is_err());
        assert_eq!(name.parse::<HealthMonitorName>().unwrap().to_string(), name);
    }

    #[test]
    fn test_malformed_hm_names() {
        assert!(gs_name_from_hm_name("amko--a--b").is_err());
        assert!(gs_name_from_hm_name("plain").is_err());
        assert!("amko--ftp--gs--/p".parse::<HealthMonitorName>().is_err());
        assert!("other--gs".parse::<HealthMonitorName>().is_err());
    }

    #[test]
    fn test_hm_types() {
        assert_eq!(hm_type_for_protocol("TCP").unwrap(), HEALTH_MONITOR_TYPE_TCP);
        assert_eq!(hm_type_for_protocol("UDP").unwrap(), HEALTH_MONITOR_TYPE_UDP);
        assert!(hm_type_for_protocol("SCTP").is_err());
        assert_eq!(hm_type_for_tls(true), HEALTH_MONITOR_TYPE_HTTPS);
        assert_eq!(hm_type_for_tls(false), HEALTH_MONITOR_TYPE_HTTP);
    }
}
