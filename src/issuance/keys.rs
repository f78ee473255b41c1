use anyhow::{Result, anyhow};

const PRIVATE_KEY_TAGS: [&str; 3] = ["PRIVATE KEY", "EC PRIVATE KEY", "RSA PRIVATE KEY"];

/// New ECDSA P-256 account key, PKCS#8 PEM.
pub fn generate_account_key_pem() -> Result<String> {
    let key = rcgen::KeyPair::generate()?;
    Ok(key.serialize_pem())
}

/// New RSA-2048 certificate key, PKCS#8 PEM.
pub fn generate_certificate_key_pem() -> Result<String> {
    let key = acme_lib::create_rsa_key(2048);
    let pem = key
        .private_key_to_pem_pkcs8()
        .map_err(|e| anyhow!("failed to serialize private key: {e}"))?;
    String::from_utf8(pem).map_err(|_| anyhow!("private key PEM contained invalid UTF-8"))
}

/// Checks that `key_pem` holds exactly one private key block in a supported encoding.
pub fn validate_private_key_pem(key_pem: &str) -> Result<()> {
    let blocks = pem::parse_many(key_pem).map_err(|e| anyhow!("invalid key PEM: {e}"))?;
    match blocks.as_slice() {
        [block] if PRIVATE_KEY_TAGS.contains(&block.tag()) => Ok(()),
        [block] => Err(anyhow!("unsupported private key type: {}", block.tag())),
        [] => Err(anyhow!("no private key found")),
        _ => Err(anyhow!("expected a single private key block")),
    }
}
