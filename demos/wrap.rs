//! # Demo: wrap
//!
//! Runs any console program as a supervised service in the foreground.
//!
//! Shows how to:
//! - Load a [`ServiceConfig`] from JSON, or build one from the command line.
//! - Expand `%NAME%` / `${NAME}` placeholders against the current environment.
//! - Attach the built-in [`LogWriter`] and a custom crash counter.
//! - Hand control to [`bridge::run_until_signal`] until Ctrl-C.
//!
//! ## Flow
//! ```text
//! ServiceConfig ──expand──► Supervisor::builder().build()
//!     └─► bridge::run_until_signal()
//!           ├─► start() ─► ChildSpawned
//!           │     child output ─► <dir>/<id>.out.log / <id>.err.log
//!           │     crash ─► ChildExited ─► FailureActionScheduled ─► start() again
//!           └─► SIGINT ─► ShutdownRequested ─► shutdown() ─► ChildStopped
//! ```
//!
//! ## Run
//! ```bash
//! # inline: id, executable, arguments
//! cargo run --example wrap -- ticker /bin/sh -c 'while true; do date; sleep 1; done'
//!
//! # from a JSON descriptor
//! cargo run --example wrap -- --config service.json
//! ```
//!
//! A descriptor looks like:
//! ```json
//! {
//!   "id": "ticker",
//!   "executable": "/bin/sh",
//!   "arguments": ["-c", "echo started; sleep 2; exit 3"],
//!   "stop_timeout": "5 sec",
//!   "log": { "directory": "%BASE%/logs", "policy": { "mode": "roll-by-size", "size_threshold": 1048576, "files_to_keep": 4 } },
//!   "failure_actions": [{ "action": "restart", "delay": "1 sec" }, { "action": "restart", "delay": "10 sec" }],
//!   "reset_failure_after": "1 hour"
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use servicevisor::{
    bridge, Event, EventKind, FailureAction, LogWriter, RotationPolicy, ServiceConfig, Subscribe,
    Supervisor,
};

/// Counts unexpected exits and prints them.
#[derive(Default)]
struct CrashCounter {
    crashes: AtomicU32,
}

#[async_trait::async_trait]
impl Subscribe for CrashCounter {
    async fn on_event(&self, ev: &Event) {
        if ev.kind == EventKind::ChildExited {
            let n = self.crashes.fetch_add(1, Ordering::Relaxed) + 1;
            println!(
                "[crash-counter] {} exited with {:?} (crash #{n})",
                ev.service.as_deref().unwrap_or("<unknown>"),
                ev.exit_code
            );
        }
    }

    fn name(&self) -> &'static str {
        "crash-counter"
    }
}

fn load_config(args: &[String]) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    match args {
        [flag, path] if flag == "--config" => {
            let raw = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        [id, exe, rest @ ..] => Ok(ServiceConfig::new(id.as_str(), exe.as_str())
            .with_arguments(rest)
            .with_log_directory("%BASE%/logs")
            .with_policy(RotationPolicy::roll_by_size())
            .with_stop_timeout(Duration::from_secs(5))
            .with_failure_actions(vec![
                FailureAction::restart(Duration::from_secs(1)),
                FailureAction::restart(Duration::from_secs(5)),
            ])
            .with_reset_failure_after(Duration::from_secs(60))),
        _ => Err("usage: wrap <id> <executable> [args...] | wrap --config <file.json>".into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let env: BTreeMap<String, String> = std::env::vars().collect();

    let cfg = load_config(&args)?
        .with_base_environment(env.clone())
        .expand(&env);

    let subs: Vec<Arc<dyn Subscribe>> = vec![
        Arc::new(LogWriter::new()),
        Arc::new(CrashCounter::default()),
    ];
    let sup = Supervisor::builder(cfg).with_subscribers(subs).build()?;

    println!(
        "wrapping {:?}; logs in {}",
        sup.config().executable,
        sup.config().resolved_log().directory.display()
    );
    let outcome = bridge::run_until_signal(&sup).await?;
    println!("stopped: {outcome:?} after {} crash(es)", sup.status().failures);
    Ok(())
}
