//! Endpoint scheme selection
//!
//! Some providers expose private or internal endpoints that only speak
//! plain HTTP. Each rule names a backend and a predicate over the bare
//! endpoint; a match selects `http://`.

use std::net::IpAddr;

/// Predicate over an endpoint without scheme, true when HTTPS must not be used
pub type PlainHttpRule = fn(&str) -> bool;

/// Backend name to plain-HTTP predicate
pub const PLAIN_HTTP_RULES: &[(&str, PlainHttpRule)] = &[
    ("ufile", ufile_internal),
    ("oss", oss_internal),
    ("jss", always),
    ("s3", s3_ip_endpoint),
    ("minio", always),
];

fn always(_endpoint: &str) -> bool {
    true
}

fn ufile_internal(endpoint: &str) -> bool {
    endpoint.contains(".internal-") || endpoint.ends_with(".ucloud.cn")
}

fn oss_internal(endpoint: &str) -> bool {
    endpoint.contains(".vpc100-oss") || endpoint.contains("internal.aliyuncs.com")
}

/// `bucket.10.0.0.1:9000` style endpoints address a private server by IP
fn s3_ip_endpoint(endpoint: &str) -> bool {
    let host = endpoint.split(':').next().unwrap_or_default();
    match host.split_once('.') {
        Some((_, rest)) => rest.parse::<IpAddr>().is_ok(),
        None => false,
    }
}

/// Returns true if `endpoint` of backend `name` supports HTTPS
pub fn supports_https(name: &str, endpoint: &str) -> bool {
    !PLAIN_HTTP_RULES
        .iter()
        .any(|(backend, plain_http)| *backend == name && plain_http(endpoint))
}

/// Prefix `endpoint` with the scheme to use
pub fn apply_scheme(name: &str, endpoint: &str, no_https: bool) -> String {
    if !no_https && supports_https(name, endpoint) {
        format!("https://{}", endpoint)
    } else {
        format!("http://{}", endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oss_internal_endpoints() {
        assert!(!supports_https("oss", "bucket.oss-cn-hangzhou-internal.aliyuncs.com"));
        assert!(!supports_https("oss", "bucket.vpc100-oss-cn-beijing.aliyuncs.com"));
        assert!(supports_https("oss", "bucket.oss-cn-hangzhou.aliyuncs.com"));
    }

    #[test]
    fn test_ufile_internal_endpoints() {
        assert!(!supports_https("ufile", "bucket.internal-cn-bj.ufileos.com"));
        assert!(!supports_https("ufile", "bucket.cn-bj.ufileos.ucloud.cn"));
        assert!(supports_https("ufile", "bucket.cn-bj.ufileos.com"));
    }

    #[test]
    fn test_s3_ip_endpoint() {
        assert!(!supports_https("s3", "bucket.10.0.0.1:9000"));
        assert!(!supports_https("s3", "bucket.192.168.1.20"));
        assert!(supports_https("s3", "bucket.s3.us-east-1.amazonaws.com"));
        assert!(supports_https("s3", "localhost"));
    }

    #[test]
    fn test_always_plain() {
        assert!(!supports_https("jss", "bucket.jcloud.com"));
        assert!(!supports_https("minio", "minio.local:9000"));
        assert!(supports_https("gs", "bucket"));
    }

    #[test]
    fn test_apply_scheme() {
        assert_eq!(
            apply_scheme("oss", "b.oss-cn-hangzhou-internal.aliyuncs.com", false),
            "http://b.oss-cn-hangzhou-internal.aliyuncs.com"
        );
        assert_eq!(apply_scheme("s3", "b.s3.amazonaws.com", false), "https://b.s3.amazonaws.com");
        assert_eq!(apply_scheme("s3", "b.s3.amazonaws.com", true), "http://b.s3.amazonaws.com");
    }
}
