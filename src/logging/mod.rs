use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Hands out writers that share one appended log file.
#[derive(Clone)]
struct SharedFileWriter {
    file: Arc<Mutex<File>>,
}

struct LockedFile {
    file: Arc<Mutex<File>>,
}

impl Write for LockedFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.file.lock() {
            Ok(mut file) => file.write(buf),
            Err(poisoned) => poisoned.into_inner().write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.file.lock() {
            Ok(mut file) => file.flush(),
            Err(poisoned) => poisoned.into_inner().flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for SharedFileWriter {
    type Writer = LockedFile;

    fn make_writer(&'a self) -> Self::Writer {
        LockedFile {
            file: self.file.clone(),
        }
    }
}

/// Initialize logging to stderr, and additionally to `log_file` when given.
///
/// `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> std::io::Result<()> {
    let default_filter = format!("nqueens_bench={level},run_nqueens={level},analyze_nqueens={level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_writer(SharedFileWriter {
                        file: Arc::new(Mutex::new(file)),
                    })
                    .with_ansi(false)
                    .with_target(true),
            )
        }
        None => None,
    };

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    Ok(())
}
