//! Logging Setup
//!
//! Console output through `env_logger`, installed before anything else so
//! startup messages are never lost. Once the telemetry providers exist the
//! OpenTelemetry log bridge is attached, and from then on records are also
//! forwarded to the log pipeline. Records emitted while a span is active
//! carry that span's trace and span ids.

use std::io::Write;
use std::sync::Arc;

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;
use opentelemetry_appender_log::OpenTelemetryLogBridge;
use opentelemetry_sdk::logs::LoggerProvider;

use super::exporter::TelemetryError;

/// Targets never forwarded to the log pipeline, so exporter internals
/// cannot feed back into the exporter.
const LOCAL_ONLY_TARGETS: &[&str] = &["opentelemetry", "tonic", "hyper", "h2", "tower"];

/// Least severe level always forwarded, whatever the console filter says.
pub const FORWARD_LEVEL: Level = Level::Info;

type ForwardSlot = Arc<OnceCell<Box<dyn Log>>>;

/// Installs the global logger with console output only.
///
/// The console filter defaults to `info` (`debug` when `verbose`) and can be
/// overridden with `RUST_LOG`. Call [`LogForwarder::attach`] on the returned
/// handle once a logger provider is available.
pub fn init_logging(verbose: bool) -> Result<LogForwarder, TelemetryError> {
    let level = if verbose { "debug" } else { "info" };

    let console = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| match record.level() {
            Level::Warn | Level::Error => {
                writeln!(buf, "[{}] {}", record.level(), record.args())
            }
            _ => writeln!(buf, "{}", record.args()),
        })
        .build();

    let logger = FanoutLogger::new(console);
    let forwarder = logger.forwarder();
    let max_level = logger.max_level();

    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);
    Ok(forwarder)
}

/// Handle for attaching the forwarding side of an installed [`FanoutLogger`].
#[derive(Clone)]
pub struct LogForwarder {
    slot: ForwardSlot,
}

impl LogForwarder {
    /// Starts forwarding records through the OpenTelemetry log bridge.
    pub fn attach(&self, provider: &LoggerProvider) {
        self.attach_logger(Box::new(OpenTelemetryLogBridge::new(provider)));
    }

    /// Starts forwarding records to `forward`. Only the first attach wins.
    pub fn attach_logger(&self, forward: Box<dyn Log>) {
        if self.slot.set(forward).is_err() {
            log::warn!("Log forwarding already attached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.slot.get().is_some()
    }
}

/// Sends each record to the console and, once attached, to a forwarding
/// logger.
///
/// The console filter decides what is printed. Records at
/// [`FORWARD_LEVEL`] or more severe are forwarded even when the console
/// filters them out.
pub struct FanoutLogger {
    console: env_logger::Logger,
    forward: ForwardSlot,
}

impl FanoutLogger {
    pub fn new(console: env_logger::Logger) -> Self {
        Self {
            console,
            forward: Arc::new(OnceCell::new()),
        }
    }

    /// Handle that attaches the forwarding logger later.
    pub fn forwarder(&self) -> LogForwarder {
        LogForwarder {
            slot: Arc::clone(&self.forward),
        }
    }

    /// Most verbose level either side accepts.
    pub fn max_level(&self) -> LevelFilter {
        self.console.filter().max(FORWARD_LEVEL.to_level_filter())
    }

    fn forwards(&self, record: &Record) -> bool {
        (record.level() <= FORWARD_LEVEL || self.console.matches(record))
            && is_forwarded(record.target())
    }
}

impl Log for FanoutLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= FORWARD_LEVEL || self.console.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.console.matches(record) {
            self.console.log(record);
        }

        if let Some(forward) = self.forward.get() {
            if self.forwards(record) {
                forward.log(record);
            }
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Some(forward) = self.forward.get() {
            forward.flush();
        }
    }
}

/// Matches on the crate segment of the target, including `_`-suffixed
/// sibling crates such as `opentelemetry_sdk`.
fn is_forwarded(target: &str) -> bool {
    let krate = target.split("::").next().unwrap_or(target);
    !LOCAL_ONLY_TARGETS.iter().any(|local| {
        krate == *local
            || krate
                .strip_prefix(local)
                .is_some_and(|rest| rest.starts_with('_'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<String>>>);

    impl Log for Capture {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.0.lock().unwrap().push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    fn fanout(filter: &str, capture: &Capture) -> FanoutLogger {
        let console = env_logger::Builder::new().parse_filters(filter).build();
        let logger = FanoutLogger::new(console);
        logger.forwarder().attach_logger(Box::new(capture.clone()));
        logger
    }

    fn emit(logger: &FanoutLogger, level: Level, target: &str, message: &str) {
        logger.log(
            &Record::builder()
                .args(format_args!("{}", message))
                .level(level)
                .target(target)
                .build(),
        );
    }

    #[test]
    fn test_forwards_accepted_records() {
        let capture = Capture::default();
        let logger = fanout("info", &capture);

        emit(&logger, Level::Info, "pipetrace::execution::engine", "Extract step completed");

        assert_eq!(capture.0.lock().unwrap().as_slice(), ["Extract step completed"]);
    }

    #[test]
    fn test_quiet_console_still_forwards_info() {
        let capture = Capture::default();
        let logger = fanout("warn", &capture);

        emit(&logger, Level::Info, "pipetrace::execution::engine", "Load step completed");
        emit(&logger, Level::Debug, "pipetrace", "noise");

        assert_eq!(capture.0.lock().unwrap().as_slice(), ["Load step completed"]);
        assert_eq!(logger.max_level(), LevelFilter::Info);
        assert!(logger.enabled(&Metadata::builder().level(Level::Info).build()));
    }

    #[test]
    fn test_verbose_console_forwards_debug() {
        let capture = Capture::default();
        let logger = fanout("debug", &capture);

        emit(&logger, Level::Debug, "pipetrace::monitoring", "Rebinding");

        assert_eq!(capture.0.lock().unwrap().len(), 1);
        assert_eq!(logger.max_level(), LevelFilter::Debug);
    }

    #[test]
    fn test_records_before_attach_stay_local() {
        let console = env_logger::Builder::new().parse_filters("info").build();
        let logger = FanoutLogger::new(console);
        let forwarder = logger.forwarder();
        assert!(!forwarder.is_attached());

        emit(&logger, Level::Info, "pipetrace::config", "Loaded configuration from etl.yaml");

        let capture = Capture::default();
        forwarder.attach_logger(Box::new(capture.clone()));
        assert!(forwarder.is_attached());

        emit(&logger, Level::Info, "pipetrace::execution::engine", "Starting pipeline");
        assert_eq!(capture.0.lock().unwrap().as_slice(), ["Starting pipeline"]);
    }

    #[test]
    fn test_second_attach_is_ignored() {
        let first = Capture::default();
        let second = Capture::default();
        let logger = fanout("info", &first);

        logger.forwarder().attach_logger(Box::new(second.clone()));
        emit(&logger, Level::Warn, "pipetrace", "slow collector");

        assert_eq!(first.0.lock().unwrap().len(), 1);
        assert!(second.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_exporter_targets_stay_local() {
        assert!(!is_forwarded("opentelemetry_sdk"));
        assert!(!is_forwarded("tonic::transport"));
        assert!(!is_forwarded("h2"));
        assert!(is_forwarded("pipetrace::execution::engine"));
        assert!(!is_forwarded("hyper_util::client"));
        assert!(is_forwarded("hyperloglog"));
    }

    #[test]
    fn test_exporter_records_not_forwarded_at_info() {
        let capture = Capture::default();
        let logger = fanout("warn", &capture);

        emit(&logger, Level::Info, "opentelemetry_sdk::metrics", "collect");

        assert!(capture.0.lock().unwrap().is_empty());
    }
}
