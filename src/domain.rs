use std::collections::BTreeSet;

use anyhow::{Result, anyhow};

pub fn normalize_domain_for_storage(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(anyhow!("domain name is required"));
    }
    let ascii =
        idna::domain_to_ascii(trimmed).map_err(|err| anyhow!("invalid domain name: {err}"))?;
    Ok(ascii.to_lowercase())
}

/// Normalizes a requested hostname list, keeping first-seen order and dropping duplicates.
pub fn normalize_hostnames<I, S>(raw: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    let mut hostnames = Vec::new();
    for entry in raw {
        let entry = entry.as_ref();
        if entry.trim().is_empty() {
            continue;
        }
        let normalized = normalize_domain_for_storage(entry)?;
        if seen.insert(normalized.clone()) {
            hostnames.push(normalized);
        }
    }
    if hostnames.is_empty() {
        return Err(anyhow!("at least one hostname is required"));
    }
    Ok(hostnames)
}

/// Canonical unordered form of a hostname list. Case, trailing dots and
/// duplicates do not affect the result.
pub fn hostname_set<S: AsRef<str>>(hostnames: &[S]) -> BTreeSet<String> {
    hostnames
        .iter()
        .map(|hostname| {
            let raw = hostname.as_ref();
            normalize_domain_for_storage(raw)
                .unwrap_or_else(|_| raw.trim().trim_end_matches('.').to_lowercase())
        })
        .filter(|hostname| !hostname.is_empty())
        .collect()
}

pub fn hostnames_match<A: AsRef<str>, B: AsRef<str>>(left: &[A], right: &[B]) -> bool {
    hostname_set(left) == hostname_set(right)
}

pub(crate) fn matches_zone(domain_suffix: &str, zone_name: &str) -> bool {
    let domain_suffix = match normalize_domain_for_storage(domain_suffix) {
        Ok(value) => value,
        Err(_) => return false,
    };
    let zone_name = match normalize_domain_for_storage(zone_name) {
        Ok(value) => value,
        Err(_) => return false,
    };
    zone_name == domain_suffix || domain_suffix.ends_with(&format!(".{}", zone_name))
}
