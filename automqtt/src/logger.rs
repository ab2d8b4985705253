use std::fs::{File, OpenOptions};
use std::io::{self, Stdout, Write};
use std::path::Path;

use anyhow::{anyhow, Result};
use slog::{b, o, Drain, Record};

use automqtt_conf::logging::{Log, To};

pub use slog::Logger;

/// Installs `logger` as the backend of the `log` facade.
pub fn logger_init(logger: Logger, level: slog::Level) -> Result<()> {
    log::set_boxed_logger(Box::new(LoggerEx(logger))).map_err(|e| anyhow!("logger init failed, {}", e))?;
    log::set_max_level(slog_log_to_level(level).to_level_filter());
    Ok(())
}

struct LoggerEx(Logger);

impl log::Log for LoggerEx {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, r: &log::Record) {
        let level = log_to_slog_level(r.metadata().level());
        let args = r.args();
        let target = r.target();
        let location = &record_as_location(r);
        let s = slog::RecordStatic { location, level, tag: target };

        self.0.log(&slog::Record::new(&s, args, b!()))
    }

    fn flush(&self) {}
}

fn log_to_slog_level(level: log::Level) -> slog::Level {
    match level {
        log::Level::Trace => slog::Level::Trace,
        log::Level::Debug => slog::Level::Debug,
        log::Level::Info => slog::Level::Info,
        log::Level::Warn => slog::Level::Warning,
        log::Level::Error => slog::Level::Error,
    }
}

fn slog_log_to_level(level: slog::Level) -> log::Level {
    match level {
        slog::Level::Trace => log::Level::Trace,
        slog::Level::Debug => log::Level::Debug,
        slog::Level::Info => log::Level::Info,
        slog::Level::Warning => log::Level::Warn,
        slog::Level::Error | slog::Level::Critical => log::Level::Error,
    }
}

fn record_as_location(r: &log::Record) -> slog::RecordLocation {
    let module = r.module_path_static().unwrap_or("<unknown>");
    let file = r.file_static().unwrap_or("<unknown>");
    let line = r.line().unwrap_or_default();

    slog::RecordLocation { file, line, column: 0, function: "", module }
}

fn timestamp_local(io: &mut dyn io::Write) -> io::Result<()> {
    write!(io, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
}

/// Root logger writing to the console and/or `<dir>/<file>`.
pub fn config_logger(cfg: &Log) -> Result<Logger> {
    let decorator = slog_term::PlainDecorator::new(WriteFilter::new(cfg)?);
    let drain = slog_term::FullFormat::new(decorator)
        .use_custom_timestamp(timestamp_local)
        .use_file_location()
        .build()
        .fuse();

    let drain = LevelFilter { drain, level: cfg.level }.fuse();

    let drain = slog_async::Async::new(drain)
        .chan_size(4096 * 4)
        .overflow_strategy(slog_async::OverflowStrategy::DropAndReport)
        .build()
        .fuse();

    Ok(Logger::root(drain, o!()))
}

struct LevelFilter<D> {
    drain: D,
    level: slog::Level,
}

impl<D> Drain for LevelFilter<D>
where
    D: Drain,
{
    type Ok = Option<D::Ok>;
    type Err = Option<D::Err>;

    fn log(&self, record: &Record, values: &slog::OwnedKVList) -> std::result::Result<Self::Ok, Self::Err> {
        if record.level().is_at_least(self.level) {
            self.drain.log(record, values).map(Some).map_err(Some)
        } else {
            Ok(None)
        }
    }
}

struct WriteFilter {
    to: To,
    file: Option<File>,
    console: Stdout,
}

impl WriteFilter {
    fn new(cfg: &Log) -> Result<Self> {
        let file = match (cfg.to.file(), cfg.filename()) {
            (true, Some(filename)) => Some(open_file(&filename)?),
            (true, None) => return Err(anyhow!("logger file config error, log.file is empty")),
            (false, _) => None,
        };
        Ok(Self { to: cfg.to, file, console: io::stdout() })
    }

    fn write_file(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(f) => f.write(buf),
            None => Ok(buf.len()),
        }
    }
}

impl io::Write for WriteFilter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match self.to {
            To::Console => self.console.write(buf)?,
            To::File => self.write_file(buf)?,
            To::Both => {
                self.console.write_all(buf)?;
                self.write_file(buf)?
            }
            To::Off => buf.len(),
        };
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.to.console() {
            self.console.flush()?;
        }
        if let Some(f) = self.file.as_mut() {
            f.flush()?;
        }
        Ok(())
    }
}

fn open_file(filename: &Path) -> Result<File> {
    if let Some(dir) = filename.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow!("logger dir config error, dir: {:?}, {:?}", dir, e))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(filename)
        .map_err(|e| anyhow!("logger file config error, filename: {:?}, {:?}", filename, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        for level in [log::Level::Trace, log::Level::Debug, log::Level::Info, log::Level::Warn, log::Level::Error] {
            assert_eq!(slog_log_to_level(log_to_slog_level(level)), level);
        }
        assert_eq!(slog_log_to_level(slog::Level::Critical), log::Level::Error);
    }

    #[test]
    fn test_write_filter_to_file() {
        let dir = std::env::temp_dir().join(format!("automqtt-logger-{}", std::process::id()));
        let cfg = Log { to: To::File, dir: dir.to_string_lossy().into_owned(), ..Default::default() };
        let mut w = WriteFilter::new(&cfg).unwrap();
        w.write_all(b"hello\n").unwrap();
        w.flush().unwrap();
        assert_eq!(std::fs::read_to_string(cfg.filename().unwrap()).unwrap(), "hello\n");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_write_filter_off() {
        let cfg = Log { to: To::Off, dir: "/nonexistent/automqtt".into(), ..Default::default() };
        let mut w = WriteFilter::new(&cfg).unwrap();
        assert_eq!(w.write(b"dropped").unwrap(), 7);
    }

    #[test]
    fn test_write_filter_without_file_name() {
        let cfg = Log { to: To::Both, file: "".into(), ..Default::default() };
        assert!(WriteFilter::new(&cfg).is_err());
    }
}
