pub mod acme;
pub mod authority;
pub mod dns;
pub mod dns_providers;
pub mod keys;

pub use acme::AcmeAuthority;
pub use authority::{AuthorityError, CertificateAuthority, KeyPolicy};
