//! Logging setup for parfold
//!
//! The device and algorithm crates only talk to the `log` facade. The CLI
//! installs `env_logger` through [`init`]; `--verbose` raises the parfold
//! crates to debug while dependencies stay at warn.
//!
//! # Log Levels
//!
//! - `error!` - kernel faults
//! - `warn!` - tasks skipped after a queue abort
//! - `info!` - driver progress
//! - `debug!` - submissions, fold plans
//! - `trace!` - per-group work inside a launch
//!
//! Without `--verbose`, `RUST_LOG` applies as usual, e.g.
//! `RUST_LOG=parfold_device=trace parfold reduce`.

use env_logger::fmt::Formatter;
use env_logger::{Builder, Env};
use log::{LevelFilter, Record};
use std::io::{self, Write};

/// Crates raised by `--verbose`.
pub const CRATES: [&str; 3] = ["parfold", "parfold_device", "parfold_algo"];

/// Filter directives keeping everything at warn except [`CRATES`], which
/// log at `level`.
pub fn directives(level: LevelFilter) -> String {
    let level = level.to_string().to_lowercase();
    let mut spec = String::from("warn");
    for name in CRATES {
        spec.push_str(&format!(",{}={}", name, level));
    }
    spec
}

/// Module path with the `parfold_` crate prefix dropped.
pub fn short_target(target: &str) -> &str {
    target.strip_prefix("parfold_").unwrap_or(target)
}

fn format_record(buf: &mut Formatter, record: &Record) -> io::Result<()> {
    writeln!(
        buf,
        "[{:5} {}] {}",
        record.level(),
        short_target(record.target()),
        record.args()
    )
}

/// Install the CLI logger.
///
/// `verbose` overrides `RUST_LOG` with [`directives`] at debug. Returns
/// false when a logger was already installed.
pub fn init(verbose: bool) -> bool {
    let mut builder = if verbose {
        let mut builder = Builder::new();
        builder.parse_filters(&directives(LevelFilter::Debug));
        builder
    } else {
        Builder::from_env(Env::default().default_filter_or("warn"))
    };
    builder.format(format_record).try_init().is_ok()
}

/// Test logger; quiet unless `RUST_LOG` is set.
pub fn init_test() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}
