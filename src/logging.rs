use std::sync::Mutex;

use tracing_subscriber::{fmt::format::FmtSpan, prelude::*, EnvFilter, Registry};

lazy_static! {
    static ref LOG_INITIALIZED: Mutex<bool> = Mutex::new(false);
}

/// Initialize logging.  Output is only enabled if the environment variable
/// `RUST_LOG` is set to a *non-empty* value, in which case it is interpreted
/// as an `EnvFilter` directive and events go to stderr so they never mix with
/// reports written to stdout.
///
/// Calling this more than once is harmless.
pub fn init_logging() {
    let mut initialized = match LOG_INITIALIZED.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if *initialized {
        return;
    }
    *initialized = true;

    // Scripts frequently set RUST_LOG unconditionally but potentially with an
    // empty value, and we don't want that to be interpreted as a desire to
    // enable logging.
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(rustlog) if !rustlog.is_empty() => match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(err) => {
                eprintln!("ignoring bad RUST_LOG {:?}: {}", rustlog, err);
                return;
            }
        },
        _ => return,
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .compact()
        // Output mostly ends up in log files where ANSI isn't helpful.
        .with_ansi(false)
        // Wall time takes up a lot of columns and we rarely care about it.
        .without_time()
        .with_filter(env_filter);

    // Somebody else (e.g. a test harness) may already own the global
    // subscriber; that's fine.
    let _ = Registry::default().with(layer).try_init();
}
