//! Line sources -- the [`LineSource`](logwarden_core::pipeline::LineSource)
//! implementations behind each `[[monitors]]` `type`.
//!
//! | type         | implementation                               |
//! |--------------|----------------------------------------------|
//! | `file`       | [`FileSource`] (poll-based follow)           |
//! | `command`    | [`ProcessSource`] running `path args...`     |
//! | `dmesg`      | [`ProcessSource`] running `dmesg -w`         |
//! | `journalctl` | [`ProcessSource`] running `journalctl -f`    |
//! | `syslog`     | [`SyslogSource`] (UDP or TCP listener)       |
//! | `stdin`      | [`StdinSource`]                              |

pub mod file;
pub mod process;
pub mod stdin;
pub mod syslog;

use std::sync::Arc;

use logwarden_core::config::MonitorConfig;
use logwarden_core::error::SourceError;
use logwarden_core::pipeline::DynLineSource;

pub use file::FileSource;
pub use process::ProcessSource;
pub use stdin::StdinSource;
pub use syslog::SyslogSource;

/// Build the line source for one monitor.
///
/// `stop_on_eof` selects the finite variant where the source has one
/// (read a file to its end, `dmesg` without `-w`, `journalctl` without `-f`).
pub fn build_source(
    config: &MonitorConfig,
    stop_on_eof: bool,
) -> Result<Arc<dyn DynLineSource>, SourceError> {
    let name = config.name.as_str();
    let source: Arc<dyn DynLineSource> = match config.source_type.as_str() {
        "file" => Arc::new(FileSource::new(name, &config.path, !stop_on_eof)),
        "command" => Arc::new(ProcessSource::command(
            name,
            &config.path,
            config.args.clone(),
        )),
        "dmesg" => Arc::new(ProcessSource::dmesg(name, !stop_on_eof)),
        "journalctl" => Arc::new(ProcessSource::journalctl(
            name,
            config.args.clone(),
            !stop_on_eof,
        )),
        "syslog" => Arc::new(SyslogSource::new(name, &config.path)?),
        "stdin" => Arc::new(StdinSource::new(name)),
        other => {
            return Err(SourceError::Open {
                name: name.to_owned(),
                reason: format!("unknown source type '{other}'"),
            });
        }
    };
    Ok(source)
}
