use cfg_if::cfg_if;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};
use tracing_subscriber::util::SubscriberInitExt;

cfg_if! {
    if #[cfg(target_arch = "wasm32")] {
        /// Install the browser console subscriber
        pub fn init() {
            // Log to browser console via tracing-wasm
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"));

            let wasm_layer = tracing_wasm::WASMLayer::new(tracing_wasm::WASMLayerConfig::default());

            tracing_subscriber::registry()
                .with(filter)
                .with(wasm_layer)
                .init();

            // Panics with stacktrace
            #[cfg(feature = "console_error_panic_hook")]
            console_error_panic_hook::set_once();
        }
    } else {
        use tracing_appender::non_blocking::WorkerGuard;
        use tracing_subscriber::fmt;
        use std::env;
        use std::io;
        use once_cell::sync::OnceCell;

        use std::ffi::OsStr;
        use std::path::Path;

        const DEFAULT_LOG_FILE: &str = "logs/koi.log";

        static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

        /// Directory and file name of a log path, falling back to the defaults
        fn split_log_path(path: &str) -> (&Path, &OsStr) {
            let path = Path::new(path);
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path.file_name().unwrap_or(OsStr::new("koi.log"));
            (directory, file_name)
        }

        /// Install stderr and rolling file subscribers plus a panic hook.
        /// Safe to call more than once; later calls keep the first subscriber.
        pub fn init() {
            // Env filter: use RUST_LOG or default to info
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"));

            // Console (stderr) layer with file/line
            let console_layer = fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .compact();

            // Daily rolling file (KOI_LOG_FILE, default logs/koi.log)
            let log_path = env::var("KOI_LOG_FILE").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
            let (directory, file_name) = split_log_path(&log_path);
            let (nb_writer, guard) = tracing_appender::non_blocking(
                tracing_appender::rolling::daily(directory, file_name)
            );
            let _ = FILE_GUARD.set(guard);

            let file_layer = fmt::layer()
                .with_writer(nb_writer)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .compact();

            if tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()
                .is_err()
            {
                return;
            }

            // Hook panics to log with backtrace
            std::panic::set_hook(Box::new(|info| {
                let mut msg = String::new();
                if let Some(loc) = info.location() {
                    msg.push_str(&format!("panic at {}:{}:{} ", loc.file(), loc.line(), loc.column()));
                }
                if let Some(s) = info.payload().downcast_ref::<&str>() { msg.push_str(s); }
                else if let Some(s) = info.payload().downcast_ref::<String>() { msg.push_str(s); }
                else { msg.push_str("<non-string panic>"); }
                let bt = std::backtrace::Backtrace::force_capture();
                tracing::error!("{}\nBacktrace:\n{:?}", msg, bt);
            }));
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn log_path_splits_into_directory_and_file() {
        let (directory, file) = split_log_path("logs/koi.log");
        assert_eq!(directory, Path::new("logs"));
        assert_eq!(file, "koi.log");

        let (directory, file) = split_log_path("pond.log");
        assert_eq!(directory, Path::new("."));
        assert_eq!(file, "pond.log");
    }

    #[test]
    fn init_twice_is_harmless() {
        init();
        init();
        tracing::info!("logging ready");
    }
}
