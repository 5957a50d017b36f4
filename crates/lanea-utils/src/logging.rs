//! Structured logging and observability for the knowledge governance core.
//!
//! One `tracing` span per component operation (`evaluate_repo_staleness`,
//! `run_repo_committee`, `meeting_continue`, …), with structured fields over
//! string interpolation, matching how the rest of the stack instruments
//! its own pipeline.

use std::io::IsTerminal;

use lanea_redaction::SecretRedactor;
use tracing::{Level, error, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Whether colored output should be used: only when stdout is a TTY and
/// `NO_COLOR` is unset.
#[must_use]
pub fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Initialize the global tracing subscriber.
///
/// `verbose` switches between a compact human format and one that emits
/// span-close events with full structured fields, the way CI logs want them.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("lanea=debug,info")
            } else {
                EnvFilter::try_new("lanea=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).compact())
            .try_init()?;
    }

    Ok(())
}

/// A span for one component operation, scoped by the governing scope string
/// (`"system"` or `"repo:<id>"`).
#[must_use]
pub fn operation_span(operation: &str, scope: &str) -> tracing::Span {
    span!(Level::INFO, "core_operation", operation = %operation, scope = %scope)
}

/// Log the start of a component operation.
pub fn log_operation_start(operation: &str, scope: &str) {
    info!(operation = %operation, scope = %scope, "starting operation");
}

/// Log the successful completion of a component operation.
pub fn log_operation_complete(operation: &str, scope: &str, duration_ms: u128) {
    info!(
        operation = %operation,
        scope = %scope,
        duration_ms = %duration_ms,
        "operation completed"
    );
}

/// Log a component operation failure. The error text is passed through
/// [`SecretRedactor`] first so that stray tokens captured from git remotes,
/// LLM payloads, or config never land in structured logs.
pub fn log_operation_error(operation: &str, scope: &str, err: &str, duration_ms: u128) {
    let redactor = SecretRedactor::new().expect("construct default secret redactor");
    let sanitized = match redactor.redact_content(err, "<log>") {
        Ok(result) => result.content,
        Err(_) => "[redaction failed]".to_string(),
    };

    error!(
        operation = %operation,
        scope = %scope,
        duration_ms = %duration_ms,
        error = %sanitized,
        "operation failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_span_carries_operation_and_scope_fields() {
        let span = operation_span("evaluate_repo_staleness", "repo:repo-a");
        assert_eq!(span.metadata().unwrap().name(), "core_operation");
    }

    #[test]
    fn log_operation_error_redacts_secrets() {
        // Exercise the redaction path end to end; it must not panic and
        // must not leave the raw secret in the (unobservable here) output.
        log_operation_error(
            "run_repo_committee",
            "repo:repo-a",
            "request failed: Authorization: Bearer sk-ant-REDACTED",
            12,
        );
    }
}
