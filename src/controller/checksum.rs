//! # Checksums
//!
//! Cheap equality oracle used before every push to the load-balancer
//! controller. Each input list is sorted, JSON-encoded and hashed with
//! FNV-1a (32 bit); the per-list hashes are summed with wrapping addition.
//!
//! Summing makes the result independent of list order but not of membership.
//! It is not a cryptographic identity; two perturbations can in theory cancel.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a, 32 bit
#[must_use]
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u32::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

fn hash_str(s: &str) -> u32 {
    fnv1a_32(s.as_bytes())
}

fn hash_sorted(list: &[String]) -> u32 {
    let mut sorted = list.to_vec();
    sorted.sort();
    // Serializing a Vec<String> cannot fail; fall back to a plain join regardless.
    let encoded = serde_json::to_string(&sorted).unwrap_or_else(|_| sorted.join(","));
    hash_str(&encoded)
}

/// Checksum of one synthesized global service
#[must_use]
pub fn service_checksum(
    ip_list: &[String],
    domain_list: &[String],
    member_objects: &[String],
    health_monitor_names: &[String],
) -> u32 {
    hash_sorted(ip_list)
        .wrapping_add(hash_sorted(domain_list))
        .wrapping_add(hash_sorted(member_objects))
        .wrapping_add(hash_sorted(health_monitor_names))
}

/// Checksum of one health-monitor definition
#[must_use]
pub fn health_monitor_checksum(name: &str, hm_type: &str, port: i32) -> u32 {
    hash_str(name)
        .wrapping_add(hash_str(hm_type))
        .wrapping_add(hash_str(&port.to_string()))
}
