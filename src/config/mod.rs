//! # Service configuration.
//!
//! Provides [`ServiceConfig`], the immutable value that drives one supervised
//! instance. It is produced once by an external loader (any serde format, or
//! the builder-style setters below) and shared read-only as `Arc<ServiceConfig>`.
//!
//! ## Lifecycle
//! ```text
//! loader ──► ServiceConfig (serde / ServiceConfig::new + with_*)
//!               ├─► expand(env snapshot)   %NAME% / ${NAME} resolved once
//!               ├─► validate()             patterns, thresholds, executable
//!               └─► Supervisor::builder(cfg)
//! ```
//!
//! ## Sentinel values
//! - `stop_timeout = 0s` → no graceful wait, the tree is killed immediately
//! - `sleep_time = 0s` → checkpoints are reported every `wait_hint`

pub(crate) mod duration;
mod expand;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::policies::{FailureAction, RotationPolicy};

pub use expand::expand_placeholders;

/// Default graceful stop timeout.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(15);
/// Default estimated time of a pending stop reported to the service manager.
pub const DEFAULT_WAIT_HINT: Duration = Duration::from_secs(15);
/// Default interval between checkpoints.
pub const DEFAULT_SLEEP_TIME: Duration = Duration::from_secs(1);
/// Default failure reset window: one day.
pub const DEFAULT_RESET_FAILURE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// How the service manager starts the service. Consumed by the bridge only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    /// Started by the boot loader (drivers only).
    Boot,
    /// Started during kernel initialization (drivers only).
    System,
    /// Started automatically at boot (default).
    #[default]
    Automatic,
    /// Started on demand.
    Manual,
    /// Cannot be started.
    Disabled,
}

/// Scheduling priority of the child.
///
/// On Unix each class maps to a niceness (see [`ProcessPriority::niceness`]);
/// raising the priority above `Normal` needs privileges and is otherwise
/// left at the inherited value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessPriority {
    /// Runs only when the system is idle.
    Idle,
    /// Below normal.
    #[serde(alias = "below_normal")]
    BelowNormal,
    /// Inherited priority (default).
    #[default]
    Normal,
    /// Above normal.
    #[serde(alias = "above_normal")]
    AboveNormal,
    /// High.
    High,
    /// Highest.
    #[serde(alias = "real_time")]
    RealTime,
}

impl ProcessPriority {
    /// Unix niceness for this class; `None` for `Normal` (left unchanged).
    pub fn niceness(self) -> Option<i32> {
        match self {
            ProcessPriority::Idle => Some(19),
            ProcessPriority::BelowNormal => Some(10),
            ProcessPriority::Normal => None,
            ProcessPriority::AboveNormal => Some(-5),
            ProcessPriority::High => Some(-10),
            ProcessPriority::RealTime => Some(-20),
        }
    }
}

/// Where and how the child's console output is persisted.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory holding the log files.
    pub directory: PathBuf,
    /// Base file name; defaults to the service id.
    pub name: String,
    /// Suffix of the stdout file (`svc` + `.out.log`).
    pub out_pattern: String,
    /// Suffix of the stderr file (`svc` + `.err.log`).
    pub err_pattern: String,
    /// Discard stdout regardless of policy.
    pub out_disabled: bool,
    /// Discard stderr regardless of policy.
    pub err_disabled: bool,
    /// Rotation rule for both streams.
    pub policy: RotationPolicy,
}

impl Default for LogConfig {
    /// Current directory, empty name (replaced by the service id), `.out.log` / `.err.log`, append.
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            name: String::new(),
            out_pattern: ".out.log".to_string(),
            err_pattern: ".err.log".to_string(),
            out_disabled: false,
            err_disabled: false,
            policy: RotationPolicy::default(),
        }
    }
}

/// Immutable configuration of one supervised instance.
///
/// ## Field semantics
/// - `environment`: per-instance overrides; they win over `base_environment`
/// - `base_environment`: environment snapshot the child starts from; taken
///   from the supervisor's own environment when the value is created, so
///   later changes to the process environment never reach the child
/// - `start_arguments`: when set, used instead of `arguments` to launch the child
/// - `stop_arguments`: when set, a stop command (`stop_executable`, or the
///   executable itself) replaces the termination signal to the child
/// - `stop_parent_first`: signal the top-level child before its descendants
/// - `wait_hint` / `sleep_time`: checkpoint cadence during a pending stop
/// - `failure_actions`: replayed with a capped index (see [`FailureScheduler`](crate::FailureScheduler))
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ServiceConfig {
    /// Service identifier (also the default log base name).
    pub id: String,
    /// Program to run.
    pub executable: PathBuf,
    /// Program arguments, one entry per argument.
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Launch arguments overriding `arguments`.
    #[serde(default)]
    pub start_arguments: Option<Vec<String>>,
    /// Program run to request a graceful stop; defaults to `executable`.
    #[serde(default)]
    pub stop_executable: Option<PathBuf>,
    /// Arguments of the stop command; the stop command is used only when set.
    #[serde(default)]
    pub stop_arguments: Option<Vec<String>>,
    /// Scheduling priority of the child.
    #[serde(default)]
    pub priority: ProcessPriority,
    /// Working directory of the child.
    #[serde(default = "current_dir")]
    pub working_directory: PathBuf,
    /// Environment overrides.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Environment snapshot the child starts from.
    #[serde(default = "inherited_environment")]
    pub base_environment: BTreeMap<String, String>,

    /// Maximum time to wait for a graceful stop before killing the process tree.
    #[serde(default = "default_stop_timeout", deserialize_with = "duration::deserialize")]
    pub stop_timeout: Duration,
    /// Signal the top-level child first, then its descendants.
    #[serde(default)]
    pub stop_parent_first: bool,
    /// Estimated time of a pending stop, reported with each checkpoint.
    #[serde(default = "default_wait_hint", deserialize_with = "duration::deserialize")]
    pub wait_hint: Duration,
    /// Interval between checkpoints (never longer than `wait_hint`).
    #[serde(default = "default_sleep_time", deserialize_with = "duration::deserialize")]
    pub sleep_time: Duration,

    /// Output capture settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Responses to consecutive unexpected terminations.
    #[serde(default)]
    pub failure_actions: Vec<FailureAction>,
    /// Stability period after which the failure count returns to zero.
    #[serde(
        default = "default_reset_failure_after",
        deserialize_with = "duration::deserialize"
    )]
    pub reset_failure_after: Duration,

    /// Start mode registered with the service manager.
    #[serde(default)]
    pub start_mode: StartMode,
    /// Request delayed automatic start (only meaningful with [`StartMode::Automatic`]).
    #[serde(default)]
    pub delayed_auto_start: bool,
}

impl ServiceConfig {
    /// Creates a configuration with defaults for everything but the id and executable.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use servicevisor::{FailureAction, RotationPolicy, ServiceConfig};
    ///
    /// let cfg = ServiceConfig::new("demo", "/usr/bin/env")
    ///     .with_arguments(["sh", "-c", "echo hello"])
    ///     .with_stop_timeout(Duration::from_secs(5))
    ///     .with_policy(RotationPolicy::Reset)
    ///     .with_failure_actions(vec![FailureAction::restart(Duration::from_secs(1))]);
    ///
    /// assert!(cfg.validate().is_ok());
    /// assert_eq!(cfg.log_name(), "demo");
    /// ```
    pub fn new(id: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            executable: executable.into(),
            arguments: Vec::new(),
            start_arguments: None,
            stop_executable: None,
            stop_arguments: None,
            priority: ProcessPriority::Normal,
            working_directory: current_dir(),
            environment: BTreeMap::new(),
            base_environment: inherited_environment(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            stop_parent_first: false,
            wait_hint: DEFAULT_WAIT_HINT,
            sleep_time: DEFAULT_SLEEP_TIME,
            log: LogConfig::default(),
            failure_actions: Vec::new(),
            reset_failure_after: DEFAULT_RESET_FAILURE_AFTER,
            start_mode: StartMode::default(),
            delayed_auto_start: false,
        }
    }

    /// Sets the argument list.
    pub fn with_arguments<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets launch arguments that take precedence over [`arguments`](Self::arguments).
    pub fn with_start_arguments<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start_arguments = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Requests graceful stops by running `executable` (or the service
    /// executable when `None`) with `args` instead of signalling the child.
    pub fn with_stop_command<I, S>(mut self, executable: Option<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_executable = executable;
        self.stop_arguments = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the scheduling priority of the child.
    pub fn with_priority(mut self, priority: ProcessPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the working directory.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = dir.into();
        self
    }

    /// Adds one environment override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Replaces the environment snapshot the child starts from.
    pub fn with_base_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.base_environment = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Sets the graceful stop timeout.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Sets the stop order.
    pub fn with_stop_parent_first(mut self, parent_first: bool) -> Self {
        self.stop_parent_first = parent_first;
        self
    }

    /// Sets the checkpoint cadence.
    pub fn with_checkpoints(mut self, wait_hint: Duration, sleep_time: Duration) -> Self {
        self.wait_hint = wait_hint;
        self.sleep_time = sleep_time;
        self
    }

    /// Sets the log directory.
    pub fn with_log_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log.directory = dir.into();
        self
    }

    /// Sets the rotation policy.
    pub fn with_policy(mut self, policy: RotationPolicy) -> Self {
        self.log.policy = policy;
        self
    }

    /// Sets the failure actions.
    pub fn with_failure_actions(mut self, actions: Vec<FailureAction>) -> Self {
        self.failure_actions = actions;
        self
    }

    /// Sets the failure reset window.
    pub fn with_reset_failure_after(mut self, window: Duration) -> Self {
        self.reset_failure_after = window;
        self
    }

    /// Arguments the child is launched with.
    pub fn launch_arguments(&self) -> &[String] {
        self.start_arguments.as_deref().unwrap_or(&self.arguments)
    }

    /// Program and arguments of the graceful stop command, if one is configured.
    pub fn stop_command(&self) -> Option<(&Path, &[String])> {
        let args = self.stop_arguments.as_deref()?;
        let exe = self.stop_executable.as_deref().unwrap_or(&self.executable);
        Some((exe, args))
    }

    /// Log base name: `log.name`, or the service id when empty.
    pub fn log_name(&self) -> &str {
        if self.log.name.is_empty() {
            &self.id
        } else {
            &self.log.name
        }
    }

    /// Log settings with the base name filled in.
    pub fn resolved_log(&self) -> LogConfig {
        LogConfig {
            name: self.log_name().to_string(),
            ..self.log.clone()
        }
    }

    /// Interval between checkpoints: `sleep_time` capped at `wait_hint`,
    /// never zero.
    #[inline]
    pub fn checkpoint_interval(&self) -> Duration {
        let interval = if self.sleep_time.is_zero() {
            self.wait_hint
        } else {
            self.sleep_time.min(self.wait_hint)
        };
        interval.max(Duration::from_millis(1))
    }

    /// Delayed automatic start as the service manager should apply it.
    #[inline]
    pub fn effective_delayed_auto_start(&self) -> bool {
        self.delayed_auto_start && self.start_mode == StartMode::Automatic
    }

    /// Environment of the child: snapshot, then `BASE` and `SERVICE_ID`,
    /// then overrides (an override wins on key collision).
    pub fn child_environment(&self) -> BTreeMap<String, String> {
        let mut env = self.base_environment.clone();
        env.insert(
            "BASE".to_string(),
            self.working_directory.to_string_lossy().into_owned(),
        );
        env.insert("SERVICE_ID".to_string(), self.id.clone());
        env.extend(
            self.environment
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        env
    }

    /// Returns a copy with `%NAME%` / `${NAME}` placeholders resolved.
    ///
    /// Variables visible to expansion: `env`, then `BASE` (working directory)
    /// and `SERVICE_ID`, then each override once it has itself been expanded.
    pub fn expand(&self, env: &BTreeMap<String, String>) -> ServiceConfig {
        let mut vars = env.clone();
        vars.insert(
            "BASE".to_string(),
            self.working_directory.to_string_lossy().into_owned(),
        );
        vars.insert("SERVICE_ID".to_string(), self.id.clone());

        let mut out = self.clone();
        out.environment.clear();
        for (key, value) in &self.environment {
            let value = expand_placeholders(value, &vars);
            vars.insert(key.clone(), value.clone());
            out.environment.insert(key.clone(), value);
        }

        let path = |p: &PathBuf, vars: &BTreeMap<String, String>| {
            PathBuf::from(expand_placeholders(&p.to_string_lossy(), vars))
        };
        out.executable = path(&self.executable, &vars);
        out.working_directory = path(&self.working_directory, &vars);
        out.log.directory = path(&self.log.directory, &vars);
        out.log.name = expand_placeholders(&self.log.name, &vars);
        let args = |list: &[String]| -> Vec<String> {
            list.iter().map(|a| expand_placeholders(a, &vars)).collect()
        };
        out.arguments = args(&self.arguments);
        out.start_arguments = self.start_arguments.as_deref().map(args);
        out.stop_arguments = self.stop_arguments.as_deref().map(args);
        out.stop_executable = self.stop_executable.as_ref().map(|p| path(p, &vars));
        out
    }

    /// Checks everything the supervisor relies on before it is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executable.as_os_str().is_empty() {
            return Err(ConfigError::MissingExecutable {
                id: self.id.clone(),
            });
        }
        if self.log.out_pattern.is_empty() || self.log.err_pattern.is_empty() {
            return Err(ConfigError::InvalidLogSettings {
                reason: "out/err file patterns must not be empty".to_string(),
            });
        }
        if self.log.out_pattern == self.log.err_pattern {
            return Err(ConfigError::InvalidLogSettings {
                reason: "stdout and stderr would share one file".to_string(),
            });
        }
        self.log.policy.validate()
    }
}

/// Snapshot of the supervisor's environment; entries that are not valid
/// UTF-8 are skipped.
fn inherited_environment() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

fn current_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_stop_timeout() -> Duration {
    DEFAULT_STOP_TIMEOUT
}

fn default_wait_hint() -> Duration {
    DEFAULT_WAIT_HINT
}

fn default_sleep_time() -> Duration {
    DEFAULT_SLEEP_TIME
}

fn default_reset_failure_after() -> Duration {
    DEFAULT_RESET_FAILURE_AFTER
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::FailureActionKind;

    #[test]
    fn test_defaults() {
        let cfg = ServiceConfig::new("svc", "app");
        assert_eq!(cfg.stop_timeout, Duration::from_secs(15));
        assert_eq!(cfg.wait_hint, Duration::from_secs(15));
        assert_eq!(cfg.sleep_time, Duration::from_secs(1));
        assert_eq!(cfg.reset_failure_after, Duration::from_secs(86_400));
        assert!(!cfg.stop_parent_first);
        assert_eq!(cfg.log.policy, RotationPolicy::Append);
        assert_eq!(cfg.start_mode, StartMode::Automatic);
        assert_eq!(cfg.log_name(), "svc");
    }

    #[test]
    fn test_child_inherits_environment_by_default() {
        std::env::set_var("SERVICEVISOR_TEST_INHERITED", "yes");
        let cfg = ServiceConfig::new("svc", "app");
        let env = cfg.child_environment();
        assert_eq!(env["SERVICEVISOR_TEST_INHERITED"], "yes");

        let json = r#"{ "id": "svc", "executable": "app" }"#;
        let cfg: ServiceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.child_environment()["SERVICEVISOR_TEST_INHERITED"], "yes");
    }

    #[test]
    fn test_start_arguments_and_stop_command() {
        let cfg = ServiceConfig::new("svc", "/opt/app/run")
            .with_arguments(["serve"])
            .with_working_directory("/srv/svc");
        assert_eq!(cfg.launch_arguments(), ["serve"]);
        assert!(cfg.stop_command().is_none());

        let cfg = cfg
            .with_start_arguments(["serve", "--id=%SERVICE_ID%"])
            .with_stop_command(None, ["stop", "%BASE%/pid"])
            .expand(&BTreeMap::new());
        assert_eq!(cfg.launch_arguments(), ["serve", "--id=svc"]);
        let (exe, args) = cfg.stop_command().unwrap();
        assert_eq!(exe, Path::new("/opt/app/run"));
        assert_eq!(args, ["stop", "/srv/svc/pid"]);

        let cfg = cfg.with_stop_command(Some("/opt/app/stop".into()), Vec::<String>::new());
        assert_eq!(cfg.stop_command().unwrap().0, Path::new("/opt/app/stop"));
    }

    #[test]
    fn test_priority_classes() {
        assert_eq!(ProcessPriority::default().niceness(), None);
        assert_eq!(ProcessPriority::Idle.niceness(), Some(19));
        assert_eq!(ProcessPriority::RealTime.niceness(), Some(-20));

        let json = r#"{ "id": "svc", "executable": "app", "priority": "belownormal" }"#;
        let cfg: ServiceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.priority, ProcessPriority::BelowNormal);
    }

    #[test]
    fn test_checkpoint_interval_never_exceeds_wait_hint() {
        let cfg = ServiceConfig::new("svc", "app")
            .with_checkpoints(Duration::from_secs(2), Duration::from_secs(10));
        assert_eq!(cfg.checkpoint_interval(), Duration::from_secs(2));

        let cfg = ServiceConfig::new("svc", "app")
            .with_checkpoints(Duration::from_secs(2), Duration::ZERO);
        assert_eq!(cfg.checkpoint_interval(), Duration::from_secs(2));

        let cfg =
            ServiceConfig::new("svc", "app").with_checkpoints(Duration::ZERO, Duration::ZERO);
        assert_eq!(cfg.checkpoint_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_child_environment_override_wins() {
        let cfg = ServiceConfig::new("svc", "app")
            .with_base_environment([("PATH", "/bin"), ("MODE", "base")])
            .with_env("MODE", "override");
        let env = cfg.child_environment();
        assert_eq!(env["PATH"], "/bin");
        assert_eq!(env["MODE"], "override");
        assert_eq!(env["SERVICE_ID"], "svc");
    }

    #[test]
    fn test_expand_resolves_injected_and_chained_values() {
        let cfg = ServiceConfig::new("svc", "%APP_HOME%/bin/app")
            .with_working_directory("/srv/svc")
            .with_env("APP_HOME", "%BASE%/current")
            .with_arguments(["--id=%SERVICE_ID%", "--home=${APP_HOME}"])
            .with_log_directory("%BASE%/logs");

        let env = BTreeMap::new();
        let out = cfg.expand(&env);

        assert_eq!(out.environment["APP_HOME"], "/srv/svc/current");
        assert_eq!(out.executable, PathBuf::from("/srv/svc/current/bin/app"));
        assert_eq!(out.arguments, vec!["--id=svc", "--home=/srv/svc/current"]);
        assert_eq!(out.log.directory, PathBuf::from("/srv/svc/logs"));
    }

    #[test]
    fn test_validate() {
        assert!(ServiceConfig::new("svc", "app").validate().is_ok());
        assert_eq!(
            ServiceConfig::new("svc", "").validate().unwrap_err().as_label(),
            "config_missing_executable"
        );

        let mut cfg = ServiceConfig::new("svc", "app");
        cfg.log.err_pattern = cfg.log.out_pattern.clone();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_delayed_auto_start_requires_automatic() {
        let mut cfg = ServiceConfig::new("svc", "app");
        cfg.delayed_auto_start = true;
        assert!(cfg.effective_delayed_auto_start());
        cfg.start_mode = StartMode::Manual;
        assert!(!cfg.effective_delayed_auto_start());
    }

    #[test]
    fn test_deserialize_full_descriptor() {
        let json = r#"{
            "id": "demo",
            "executable": "/usr/bin/demo",
            "arguments": ["--port", "8080"],
            "stop_timeout": "60sec",
            "stop_parent_first": true,
            "wait_hint": "20 min",
            "sleep_time": 500,
            "reset_failure_after": "1 hour",
            "start_mode": "manual",
            "log": {
                "directory": "/var/log/demo",
                "policy": { "mode": "roll-by-size", "size_threshold": 1024, "files_to_keep": 3 }
            },
            "failure_actions": [
                { "action": "restart", "delay": "10 sec" },
                { "action": "reboot" }
            ]
        }"#;
        let cfg: ServiceConfig = serde_json::from_str(json).unwrap();

        assert_eq!(cfg.stop_timeout, Duration::from_secs(60));
        assert!(cfg.stop_parent_first);
        assert_eq!(cfg.wait_hint, Duration::from_secs(1200));
        assert_eq!(cfg.sleep_time, Duration::from_millis(500));
        assert_eq!(cfg.reset_failure_after, Duration::from_secs(3600));
        assert_eq!(cfg.start_mode, StartMode::Manual);
        assert_eq!(cfg.log.out_pattern, ".out.log");
        assert_eq!(
            cfg.log.policy,
            RotationPolicy::RollBySize {
                size_threshold: 1024,
                files_to_keep: 3
            }
        );
        assert_eq!(cfg.failure_actions.len(), 2);
        assert_eq!(cfg.failure_actions[1].kind, FailureActionKind::Reboot);
        assert_eq!(cfg.log_name(), "demo");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_deserialize_rejects_bad_duration() {
        let json = r#"{ "id": "demo", "executable": "x", "stop_timeout": "soon" }"#;
        assert!(serde_json::from_str::<ServiceConfig>(json).is_err());
    }
}
