use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize standard structured logging. Safe to call more than once;
/// later calls are ignored (relevant in the test harness and restart paths).
pub(crate) fn init() {
    let level = match std::env::var("COLLOQUY_LOG").as_deref() {
        Ok("debug") => Level::DEBUG,
        Ok("warn") => Level::WARN,
        Ok("error") => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
