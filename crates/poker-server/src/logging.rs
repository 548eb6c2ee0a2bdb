//! Tracing setup.
//!
//! Each area of the server logs under its own `poker::<area>` target. The
//! level for every target at every verbosity lives in [`TARGET_LEVELS`];
//! `--log area=level` replaces one entry and `RUST_LOG` replaces the table.

use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const ERROR: LevelFilter = LevelFilter::ERROR;
const WARN: LevelFilter = LevelFilter::WARN;
const INFO: LevelFilter = LevelFilter::INFO;
const DEBUG: LevelFilter = LevelFilter::DEBUG;
const TRACE: LevelFilter = LevelFilter::TRACE;

/// Level of each target, indexed by [`Verbosity`].
///
/// Round and broadcast chatter is per vote or per frame, so it stays at
/// `warn` until asked for.
const TARGET_LEVELS: [(&str, [LevelFilter; 5]); 9] = [
    //                  quiet  normal verbose debug  trace
    ("poker::startup", [WARN, INFO, INFO, DEBUG, TRACE]),
    ("poker::ws", [WARN, INFO, INFO, DEBUG, TRACE]),
    ("poker::join", [WARN, INFO, INFO, DEBUG, TRACE]),
    ("poker::round", [WARN, WARN, INFO, DEBUG, TRACE]),
    ("poker::queue", [WARN, INFO, INFO, DEBUG, TRACE]),
    ("poker::suggest", [WARN, INFO, INFO, DEBUG, TRACE]),
    ("poker::broadcast", [WARN, WARN, INFO, INFO, TRACE]),
    ("poker::tracker", [WARN, INFO, INFO, DEBUG, TRACE]),
    ("tower_http", [ERROR, WARN, INFO, DEBUG, TRACE]),
];

/// How much the server says. Picked from the `-q`/`-v`/`-d`/`--trace` flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    Quiet = 0,
    #[default]
    Normal = 1,
    Verbose = 2,
    Debug = 3,
    Trace = 4,
}

impl Verbosity {
    /// The quietest flag given wins, then the most detailed.
    pub fn from_flags(quiet: bool, verbose: bool, debug: bool, trace: bool) -> Self {
        match (quiet, trace, debug, verbose) {
            (true, ..) => Self::Quiet,
            (_, true, ..) => Self::Trace,
            (_, _, true, _) => Self::Debug,
            (_, _, _, true) => Self::Verbose,
            _ => Self::Normal,
        }
    }

    fn level_of(self, target: &str) -> Option<LevelFilter> {
        TARGET_LEVELS
            .iter()
            .find(|(name, _)| *name == target)
            .map(|(_, levels)| levels[self as usize])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub verbosity: Verbosity,
    pub format: LogFormat,
    overrides: Vec<(String, LevelFilter)>,
    rejected: Vec<String>,
}

impl LogSettings {
    pub fn new(verbosity: Verbosity, format: LogFormat) -> Self {
        Self {
            verbosity,
            format,
            ..Self::default()
        }
    }

    /// Apply `--log` values. Each is one or more comma-separated
    /// `target=level` pairs. A bare area name such as `join` means
    /// `poker::join`. Unparseable pairs are kept aside and reported by
    /// [`init`].
    pub fn with_overrides<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for spec in specs {
            for pair in spec.as_ref().split(',').map(str::trim).filter(|p| !p.is_empty()) {
                match parse_override(pair) {
                    Some((target, level)) => self.set(target, level),
                    None => self.rejected.push(pair.to_string()),
                }
            }
        }
        self
    }

    fn set(&mut self, target: String, level: LevelFilter) {
        match self.overrides.iter_mut().find(|(t, _)| *t == target) {
            Some(entry) => entry.1 = level,
            None => self.overrides.push((target, level)),
        }
    }

    /// Effective level for `target`, if it is one the server knows about
    /// or one that was overridden.
    pub fn level_of(&self, target: &str) -> Option<LevelFilter> {
        self.overrides
            .iter()
            .find(|(t, _)| t == target)
            .map(|(_, level)| *level)
            .or_else(|| self.verbosity.level_of(target))
    }

    /// `target=level` directives: the table row for every known target, then
    /// any overridden targets outside the table.
    pub fn directives(&self) -> Vec<String> {
        let mut directives = Vec::with_capacity(TARGET_LEVELS.len() + self.overrides.len());
        for (target, levels) in TARGET_LEVELS {
            let level = self.level_of(target).unwrap_or(levels[self.verbosity as usize]);
            directives.push(format!("{target}={level}"));
        }
        for (target, level) in &self.overrides {
            if self.verbosity.level_of(target).is_none() {
                directives.push(format!("{target}={level}"));
            }
        }
        directives
    }

    fn filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
        EnvFilter::try_new(self.directives().join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// `join=debug`, `poker::join=debug` and `hyper=warn` are all accepted.
fn parse_override(pair: &str) -> Option<(String, LevelFilter)> {
    let (target, level) = pair.split_once('=')?;
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    let level = match level.trim() {
        l if l.eq_ignore_ascii_case("warning") => WARN,
        "" => return None,
        l => l.parse().ok()?,
    };

    let area = format!("poker::{target}");
    let target = if Verbosity::Normal.level_of(&area).is_some() {
        area
    } else {
        target.to_string()
    };
    Some((target, level))
}

/// Install the global subscriber.
pub fn init(settings: &LogSettings) {
    let registry = tracing_subscriber::registry().with(settings.filter());
    match settings.format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
    }

    for pair in &settings.rejected {
        warn!(target: "poker::startup", "Ignoring --log {:?}: expected target=level", pair);
    }
}
