//! The implementation of the `GENRAD_LOG*` environment variables.
//!
//! Note that IR dumping (`GENRAD_LOG_IR`) is only meaningfully available when the `genrad` feature
//! is enabled: otherwise we expose no-op functions.

use std::{env, error::Error, fs::File, io::Write, path::PathBuf};
use strum::{EnumCount, FromRepr};

pub(crate) mod stats;

/// How verbose should the allocator's normal logging be?
#[repr(u8)]
#[derive(Copy, Clone, Debug, EnumCount, FromRepr, PartialEq, PartialOrd)]
pub(crate) enum Verbosity {
    /// Disable logging entirely.
    Disabled,
    /// Log errors.
    Error,
    /// Log warnings.
    Warning,
    /// Log the start and end of each allocator phase.
    Phase,
    /// Log individual allocator events (allocations, copies, expirations).
    Event,
}

pub(crate) struct Log {
    /// The requested [Verbosity] level for logging.
    level: Verbosity,
    /// The path to write to. A value of `None` means stderr.
    path: Option<PathBuf>,
}

impl Log {
    pub(crate) fn new() -> Result<Self, Box<dyn Error>> {
        match env::var("GENRAD_LOG") {
            Ok(s) => Self::from_spec(&s),
            Err(_) => Ok(Self {
                path: None,
                level: Verbosity::Error,
            }),
        }
    }

    /// A log which never outputs anything.
    pub(crate) fn disabled() -> Self {
        Self {
            path: None,
            level: Verbosity::Disabled,
        }
    }

    /// Parse a `GENRAD_LOG` style specification `[<path|->:]<level>`.
    fn from_spec(s: &str) -> Result<Self, Box<dyn Error>> {
        let (path, level) = match s.split(':').collect::<Vec<_>>()[..] {
            [path, level] => {
                if path == "-" {
                    (None, level)
                } else {
                    let path = PathBuf::from(path);
                    // If there's an existing log file, truncate (i.e. empty it), so that later
                    // appends to the log aren't appending to a previous log run.
                    File::create(&path).ok();
                    (Some(path), level)
                }
            }
            [level] => (None, level),
            [..] => return Err("GENRAD_LOG must be of the format `[<path|->:]<level>`".into()),
        };
        let level = level
            .parse::<u8>()
            .map_err(|e| format!("Invalid GENRAD_LOG level '{s}': {e}"))?;
        let max_level = Verbosity::COUNT - 1;
        let level = Verbosity::from_repr(level)
            .ok_or_else(|| format!("GENRAD_LOG level {level} exceeds maximum {max_level}"))?;
        Ok(Self { path, level })
    }

    /// Would a message at `level` be output?
    pub(crate) fn enabled(&self, level: Verbosity) -> bool {
        level <= self.level && level != Verbosity::Disabled
    }

    /// Log `msg` with the [Verbosity] level `level`.
    ///
    /// # Panics
    ///
    /// If `level == Verbosity::Disabled`.
    pub(crate) fn log(&self, level: Verbosity, msg: &str) {
        if level <= self.level {
            let prefix = match level {
                Verbosity::Disabled => panic!(),
                Verbosity::Error => "genra-error",
                Verbosity::Warning => "genra-warning",
                Verbosity::Phase => "genra-phase",
                Verbosity::Event => "genra-event",
            };
            match &self.path {
                Some(p) => {
                    let s = format!("{prefix}: {msg}\n");
                    File::options()
                        .append(true)
                        .open(p)
                        .map(|mut x| x.write(s.as_bytes()))
                        .ok();
                }
                None => {
                    eprintln!("{prefix}: {msg}");
                }
            }
        }
    }
}

#[derive(Eq, Hash, PartialEq)]
#[allow(dead_code)]
pub(crate) enum IRPhase {
    /// The selection stream as handed to us.
    PreCoalesce,
    /// The selection stream after copies for vectors have been inserted.
    PostCoalesce,
    /// The live interval of every used register.
    Intervals,
    /// The final allocation map.
    RA,
}

#[cfg(not(feature = "genrad"))]
mod internals {
    use super::IRPhase;
    use std::error::Error;

    pub(crate) fn check_log_ir() -> Result<(), Box<dyn Error>> {
        Ok(())
    }
    pub(crate) fn should_log_ir(_: IRPhase) -> bool {
        false
    }
    pub(crate) fn log_ir(_: &str) {}
}

#[cfg(feature = "genrad")]
mod internals {
    use super::IRPhase;
    use std::{collections::HashSet, env, error::Error, fs::File, io::Write, sync::LazyLock};

    /// The path (`-` for stderr) and phases requested by `GENRAD_LOG_IR`, or the reason the
    /// variable couldn't be parsed.
    static LOG_IR: LazyLock<Result<Option<(String, HashSet<IRPhase>)>, String>> =
        LazyLock::new(|| match env::var("GENRAD_LOG_IR") {
            Ok(x) => match parse_log_ir(&x) {
                Ok((path, phases)) => {
                    if path != "-" {
                        // If there's an existing log file, truncate (i.e. empty it), so that later
                        // appends to the log aren't appending to a previous log run.
                        File::create(&path).ok();
                    }
                    Ok(Some((path, phases)))
                }
                Err(e) => Err(e.to_string()),
            },
            Err(_) => Ok(None),
        });

    /// Parse a `GENRAD_LOG_IR` value of the form `[<path>:]<phase_1>[,...,<phase_n>]`.
    fn parse_log_ir(s: &str) -> Result<(String, HashSet<IRPhase>), Box<dyn Error>> {
        let (path, phases) = match s.split(':').collect::<Vec<_>>().as_slice() {
            [path, phases] => (*path, *phases),
            [phases] => ("-", *phases),
            _ => {
                return Err(
                    "GENRAD_LOG_IR must be of the format '[<path>:]<phase_1>[,...,<phase_n>]'"
                        .into(),
                )
            }
        };
        let phases = phases
            .split(',')
            .map(IRPhase::from_str)
            .collect::<Result<HashSet<_>, _>>()?;
        Ok((path.to_string(), phases))
    }

    fn log_ir_target() -> Option<&'static (String, HashSet<IRPhase>)> {
        LOG_IR.as_ref().ok().and_then(|x| x.as_ref())
    }

    impl IRPhase {
        fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
            match s {
                "sel-pre-coalesce" => Ok(Self::PreCoalesce),
                "sel-post-coalesce" => Ok(Self::PostCoalesce),
                "intervals" => Ok(Self::Intervals),
                "ra" => Ok(Self::RA),
                _ => Err(format!("Invalid GENRAD_LOG_IR value: {s}").into()),
            }
        }
    }

    /// Report a malformed `GENRAD_LOG_IR`.
    pub(crate) fn check_log_ir() -> Result<(), Box<dyn Error>> {
        match &*LOG_IR {
            Ok(_) => Ok(()),
            Err(e) => Err(e.clone().into()),
        }
    }

    pub(crate) fn should_log_ir(phase: IRPhase) -> bool {
        log_ir_target().is_some_and(|(_, phases)| phases.contains(&phase))
    }

    pub(crate) fn log_ir(s: &str) {
        match log_ir_target().map(|(p, _)| p.as_str()) {
            Some("-") => eprint!("{s}"),
            Some(x) => {
                File::options()
                    .append(true)
                    .open(x)
                    .map(|mut x| x.write(s.as_bytes()))
                    .ok();
            }
            None => (),
        }
    }

}

pub(crate) use internals::{check_log_ir, log_ir, should_log_ir};
