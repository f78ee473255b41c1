pub mod orchestrator;
pub mod validity;

pub use orchestrator::{Clock, LifecycleError, LifecycleOrchestrator};
pub use validity::{CertificateState, DEFAULT_RENEWAL_WINDOW_HOURS, RenewalPolicy};
