use console::Term;

/// Conventional exit status for SIGINT.
pub(crate) const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Resolve on the first Ctrl+C.
///
/// Callers race this against the running command; dropping the command future
/// abandons the fetch between requests, and the cache is only ever written
/// whole, so nothing needs flushing.
pub(crate) async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }

    if Term::stderr().is_term() {
        eprintln!("\nInterrupted.");
    } else {
        tracing::warn!("Interrupted, abandoning current operation");
    }
}
