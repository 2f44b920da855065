//! Selection of the backend that implements the bootstrap lock.

use {
    crate::error::ConfigError,
    std::{
        env,
        fmt::{self, Display, Formatter},
        str::FromStr,
        sync::OnceLock,
    },
};


/// The environment variable consulted when the backend was never configured
/// explicitly.
pub const BACKEND_ENV_VAR: &str = "BOOTSTRAP_LOCK_BACKEND";

const NAMES: &[&str] = &["critical-region", "signal-object"];

static SETTING: OnceLock<BackendChoice> = OnceLock::new();

/// The primitive the bootstrap lock is built on.
///
/// The choice is made once per process and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum BackendChoice {
    /// A native mutex that spins briefly before parking.
    ///
    /// This is the fast option. On some platforms the native critical region cannot
    /// safely be entered by a thread while the holder is being suspended by that same
    /// thread, which leaves both threads parked forever. Processes that suspend threads
    /// from the outside, e.g. debuggers and profilers, should not use it.
    CriticalRegion,
    /// An auto-reset signal that starts out raised and is consumed by exactly one
    /// waiter.
    ///
    /// Considerably slower when uncontended but free of the suspension hazard.
    #[default]
    SignalObject,
}

impl BackendChoice {
    /// Returns the canonical name of this backend.
    pub const fn name(self) -> &'static str {
        match self {
            BackendChoice::CriticalRegion => NAMES[0],
            BackendChoice::SignalObject => NAMES[1],
        }
    }
}

impl Display for BackendChoice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendChoice {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "critical-region" => Ok(BackendChoice::CriticalRegion),
            "signal-object" => Ok(BackendChoice::SignalObject),
            _ => Err(ConfigError::UnknownBackend {
                raw: s.to_owned(),
                expected: NAMES,
            }),
        }
    }
}

/// Fixes the process-wide backend setting.
///
/// This must happen before the bootstrap lock is first acquired. Configuring the value
/// that is already in effect is a no-op.
///
/// # Errors
///
/// Returns [`ConfigError::AlreadyFixed`] if the setting has already been fixed to a
/// different backend, either by an earlier call to this function or because the
/// setting was read by [`configured`].
///
/// # Example
///
/// ```
/// use bootstrap_lock::{BackendChoice, configure, configured};
///
/// configure(BackendChoice::CriticalRegion).unwrap();
/// assert_eq!(configured(), BackendChoice::CriticalRegion);
/// assert!(configure(BackendChoice::SignalObject).is_err());
/// ```
pub fn configure(choice: BackendChoice) -> Result<(), ConfigError> {
    let current = *SETTING.get_or_init(|| choice);
    if current == choice {
        Ok(())
    } else {
        Err(ConfigError::AlreadyFixed {
            current,
            requested: choice,
        })
    }
}

/// Returns the process-wide backend setting and fixes it.
///
/// If [`configure`] was never called, the value of [`BACKEND_ENV_VAR`] is used. An
/// unset variable selects the default backend. An unparsable value is logged and also
/// selects the default backend.
pub fn configured() -> BackendChoice {
    let mut rejected = None;
    let choice = *SETTING.get_or_init(|| {
        let raw = env::var_os(BACKEND_ENV_VAR);
        let (choice, err) =
            choice_from_setting(raw.as_ref().map(|raw| raw.to_string_lossy()).as_deref());
        rejected = err;
        choice
    });
    // Logged after the setting is fixed so that a subscriber may call back into this
    // crate.
    if let Some(e) = rejected {
        tracing::warn!(%e, fallback = %choice, "ignoring {BACKEND_ENV_VAR}");
    }
    choice
}

/// Returns the backend selected by `raw` and the parse error if `raw` was rejected.
pub(crate) fn choice_from_setting(raw: Option<&str>) -> (BackendChoice, Option<ConfigError>) {
    match raw.map(str::parse) {
        None => (BackendChoice::default(), None),
        Some(Ok(choice)) => (choice, None),
        Some(Err(e)) => (BackendChoice::default(), Some(e)),
    }
}
