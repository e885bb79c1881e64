//! Shared bits for the bots in this workspace: logging and runtime startup,
//! plus a few conveniences over teloxide messages.

use std::future::Future;

pub mod useful_methods;

/// Initialize logging and start the `closure` in an async runtime.
///
/// Log filters come from the `RUST_LOG` environment variable, falling back to
/// `default_filter` if it's unset or not valid unicode. This uses the crate
/// [pretty_env_logger][] internally, see its documentation for more details.
///
/// Timestamps are left out when running as a systemd service, since journald
/// stamps every line on its own.
///
/// [pretty_env_logger]: https://docs.rs/pretty_env_logger
///
/// # Panics
///
/// Panics if the tokio runtime fails to build.
pub fn start_everything(default_filter: &str, closure: impl Future<Output = ()>) {
    let log_filter = std::env::var_os("RUST_LOG")
        .and_then(|x| x.into_string().ok())
        .unwrap_or_else(|| default_filter.to_string());

    let running_as_systemd_service = std::env::var_os("JOURNAL_STREAM").is_some();

    let mut builder = match running_as_systemd_service {
        true => pretty_env_logger::formatted_builder(),
        false => pretty_env_logger::formatted_timed_builder(),
    };

    builder.parse_filters(&log_filter);

    if builder.try_init().is_err() {
        log::error!("Tried to init logger twice!");
    }

    log::info!("Logging with filter \"{log_filter}\"");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build the tokio runtime!")
        .block_on(closure);
}
