//! autocert - issue, renew and distribute TLS certificates.
//!
//! Runs once and exits, or with `AUTOCERT_LISTENER_MODE=true` waits for
//! HTTP triggers.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

use autocert::core::config::{ConfigError, Settings};
use autocert::core::types::DispatchReport;
use autocert::distribution::{CancellationFlag, RunnerFanOut, build_targets};
use autocert::issuance::AcmeAuthority;
use autocert::issuance::dns_providers::publisher_for_provider;
use autocert::lifecycle::{LifecycleError, LifecycleOrchestrator, RenewalPolicy};
use autocert::listener::{self, RunRequest};
use autocert::secrets::{SecretStore, open_secret_store};

const EXIT_TARGET_FAILED: u8 = 1;
const EXIT_FATAL: u8 = 2;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut settings = Settings::parse();
    if let Err(err) = settings.validate() {
        error!("[config] {}", err);
        return ExitCode::from(EXIT_FATAL);
    }

    let cancellation = CancellationFlag::new();
    let orchestrator = match build_orchestrator(&settings, cancellation.clone()) {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            error!("[config] {}", err);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start async runtime: {}", err);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let request = RunRequest {
        email: settings.email.clone(),
        hostnames: settings.hostnames.0.clone(),
        force_renew: settings.force_renew,
    };

    if settings.listener_mode {
        let app = listener::router(Arc::new(orchestrator), request);
        let shutdown = {
            let cancellation = cancellation.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, shutting down");
                }
                cancellation.cancel();
            }
        };
        return match runtime.block_on(listener::serve(settings.listener_port, app, shutdown)) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("[listener] {:#}", err);
                ExitCode::from(EXIT_FATAL)
            }
        };
    }

    runtime.spawn({
        let cancellation = cancellation.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling dispatch");
                cancellation.cancel();
            }
        }
    });

    let result = orchestrator.run(&request.email, &request.hostnames, request.force_renew);
    log_result(&result);
    ExitCode::from(exit_code(&result))
}

fn build_orchestrator(
    settings: &Settings,
    cancellation: CancellationFlag,
) -> Result<LifecycleOrchestrator, ConfigError> {
    let store: Arc<dyn SecretStore> = Arc::from(open_secret_store(settings)?);
    let publisher = publisher_for_provider(settings)?;
    let authority = Arc::new(AcmeAuthority::new(
        settings.acme_url.clone(),
        publisher,
        settings.key_policy,
    ));
    let targets = build_targets(settings)?;

    Ok(LifecycleOrchestrator::new(store, authority, targets)
        .with_policy(RenewalPolicy::new(settings.renewal_window()))
        .with_fanout(RunnerFanOut::new(cancellation)))
}

fn log_result(result: &Result<DispatchReport, LifecycleError>) {
    match result {
        Ok(report) if report.attempted == 0 => info!("run finished: nothing to distribute"),
        Ok(report) => {
            info!(
                "run finished: {} of {} target(s) updated",
                report.succeeded, report.attempted
            );
            for failure in report.failures() {
                warn!(
                    "target {} failed: {}",
                    failure.target,
                    failure.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        Err(err) => error!("run aborted: {}", err),
    }
}

fn exit_code(result: &Result<DispatchReport, LifecycleError>) -> u8 {
    match result {
        Ok(report) if report.has_failures() => EXIT_TARGET_FAILED,
        Ok(_) => 0,
        Err(_) => EXIT_FATAL,
    }
}
