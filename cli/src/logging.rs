use std::path::Path;
use tracing_core::{Level, LevelFilter};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, Layer};

/// Routes `log` records either to `log_file` or to stderr. With a progress
/// bar on stderr only warnings and errors are printed there.
///
/// If a global subscriber is already installed it is left alone.
pub fn install(log_file: Option<&Path>, progress_on_stderr: bool) -> Result<(), neural_style::Error> {
    let file_layer = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("the log path '{}' doesn't point to a file", path.display()),
                )
            })?;

            std::fs::create_dir_all(dir)?;
            let writer = tracing_appender::rolling::never(dir, file_name);

            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(LevelFilter::INFO)
                    .with_filter(filter_fn(|m| {
                        // wgpu is far too chatty at info level
                        match m.module_path() {
                            Some(path) => !(path.starts_with("wgpu") && *m.level() >= Level::INFO),
                            None => true,
                        }
                    })),
            )
        }
        None => None,
    };

    let stderr_layer = if log_file.is_none() {
        let level = if progress_on_stderr {
            LevelFilter::WARN
        } else {
            LevelFilter::INFO
        };

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(level),
        )
    } else {
        None
    };

    let installed = registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        if let Some(path) = log_file {
            update_panic_hook(path);
        }
    }

    Ok(())
}

fn update_panic_hook(file_path: &Path) {
    let hook = std::panic::take_hook();
    let file_path = file_path.display().to_string();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {}", info);
        eprintln!(
            "=== PANIC ===\nA fatal error happened, you can check the log here => '{}'\n=============",
            file_path
        );
        hook(info);
    }));
}
