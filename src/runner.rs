//! External step execution.
//!
//! The runner knows nothing about assets or routing: it launches one program,
//! waits for it, and folds every OS-level outcome into a [`RunResult`]. It
//! never returns an error to the caller.
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Variables treated as search-path lists: overrides are prepended, not replaced.
pub const PATH_LIST_VARS: [&str; 3] = ["PYTHONPATH", "PATH", "LD_LIBRARY_PATH"];

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One fully-resolved step invocation.
#[derive(Debug, Clone)]
pub struct StepCommand {
    /// Human-readable name used in logs.
    pub name: String,
    /// Stable id used for log file names and the step history.
    pub step_id: String,
    /// Interpreter argv (e.g. `["python3"]`); empty means `target` is executed directly.
    pub interpreter: Vec<String>,
    /// Script or executable that must exist on disk.
    pub target: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl StepCommand {
    /// Full argv as it will be spawned, for provenance and logging.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.interpreter.clone();
        argv.push(self.target.display().to_string());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// Where per-asset step logs go: `<log_dir>/<asset_id>/<step_id>.{stdout,stderr}.log`.
#[derive(Debug, Clone)]
pub struct LogTarget {
    pub log_dir: PathBuf,
    pub asset_id: String,
}

impl LogTarget {
    pub fn new(log_dir: impl Into<PathBuf>, asset_id: impl Into<String>) -> Self {
        Self {
            log_dir: log_dir.into(),
            asset_id: asset_id.into(),
        }
    }

    pub fn asset_dir(&self) -> PathBuf {
        self.log_dir.join(&self.asset_id)
    }

    pub fn stdout_path(&self, step_id: &str) -> PathBuf {
        self.asset_dir().join(format!("{step_id}.stdout.log"))
    }

    pub fn stderr_path(&self, step_id: &str) -> PathBuf {
        self.asset_dir().join(format!("{step_id}.stderr.log"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout_log: Option<PathBuf>,
    pub stderr_log: Option<PathBuf>,
    pub duration_s: f64,
    pub timed_out: bool,
    /// The target did not exist, so nothing was launched.
    pub executable_missing: bool,
    pub spawn_error: Option<String>,
}

impl RunResult {
    fn missing() -> Self {
        Self {
            success: false,
            exit_code: -1,
            stdout_log: None,
            stderr_log: None,
            duration_s: 0.0,
            timed_out: false,
            executable_missing: true,
            spawn_error: None,
        }
    }

    /// Captured log files, stdout first.
    pub fn log_paths(&self) -> Vec<PathBuf> {
        self.stdout_log
            .iter()
            .chain(self.stderr_log.iter())
            .cloned()
            .collect()
    }

    /// One-line description of why the step did not succeed.
    pub fn failure_summary(&self) -> String {
        if self.executable_missing {
            "executable not found".to_string()
        } else if let Some(err) = &self.spawn_error {
            format!("failed to launch: {err}")
        } else if self.timed_out {
            format!("timed out after {:.1}s", self.duration_s)
        } else if self.success {
            "succeeded".to_string()
        } else {
            format!("exited with code {}", self.exit_code)
        }
    }
}

struct Completion {
    status: Option<ExitStatus>,
    timed_out: bool,
}

/// Launches steps one at a time; the default timeout applies when a command has none.
#[derive(Debug, Clone, Default)]
pub struct StepRunner {
    default_timeout: Option<Duration>,
}

impl StepRunner {
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self { default_timeout }
    }

    pub fn run(&self, command: &StepCommand, logs: Option<&LogTarget>) -> RunResult {
        if !command.target.exists() {
            tracing::warn!(
                step = %command.name,
                target = %command.target.display(),
                "step executable not found, skipping"
            );
            return RunResult::missing();
        }

        let stdout_log = logs.map(|target| target.stdout_path(&command.step_id));
        let stderr_log = logs.map(|target| target.stderr_path(&command.step_id));
        let timeout = command.timeout.or(self.default_timeout);

        let argv = command.argv();
        tracing::info!(
            step = %command.name,
            command = %crate::util::format_command_line(&argv[0], &argv[1..]),
            "starting step"
        );

        let start = Instant::now();
        let outcome = spawn_and_wait(
            command,
            stdout_log.as_deref(),
            stderr_log.as_deref(),
            timeout,
        );
        let elapsed = start.elapsed();
        let existing = |path: Option<PathBuf>| path.filter(|path| path.is_file());

        match outcome {
            Ok(completion) => {
                let exit_code = completion
                    .status
                    .and_then(|status| status.code())
                    .unwrap_or(-1);
                let success = !completion.timed_out
                    && completion.status.is_some_and(|status| status.success());
                let result = RunResult {
                    success,
                    exit_code,
                    stdout_log: existing(stdout_log),
                    stderr_log: existing(stderr_log),
                    duration_s: elapsed.as_secs_f64(),
                    timed_out: completion.timed_out,
                    executable_missing: false,
                    spawn_error: None,
                };
                if success {
                    tracing::info!(
                        step = %command.name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "step complete"
                    );
                } else {
                    tracing::warn!(
                        step = %command.name,
                        exit_code,
                        timed_out = completion.timed_out,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "step failed"
                    );
                }
                result
            }
            Err(err) => {
                tracing::warn!(step = %command.name, error = %format!("{err:#}"), "step failed to launch");
                RunResult {
                    success: false,
                    exit_code: -1,
                    stdout_log: existing(stdout_log),
                    stderr_log: existing(stderr_log),
                    duration_s: elapsed.as_secs_f64(),
                    timed_out: false,
                    executable_missing: false,
                    spawn_error: Some(format!("{err:#}")),
                }
            }
        }
    }
}

fn spawn_and_wait(
    command: &StepCommand,
    stdout_log: Option<&Path>,
    stderr_log: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<Completion> {
    let mut cmd = match command.interpreter.split_first() {
        Some((program, rest)) => {
            let mut cmd = Command::new(program);
            cmd.args(rest).arg(&command.target);
            cmd
        }
        None => Command::new(&command.target),
    };
    cmd.args(&command.args);
    cmd.env_clear();
    cmd.envs(build_env(std::env::vars_os(), &command.env));

    if let Some(path) = stdout_log {
        cmd.stdout(Stdio::from(create_log_file(path)?));
    }
    if let Some(path) = stderr_log {
        cmd.stderr(Stdio::from(create_log_file(path)?));
    }

    // Own process group, so a deadline also reaches grandchildren such as the
    // python process behind `conda run`.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn {}", command.name))?;

    let Some(timeout) = timeout else {
        let status = child
            .wait()
            .with_context(|| format!("wait for {}", command.name))?;
        return Ok(Completion {
            status: Some(status),
            timed_out: false,
        });
    };

    loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("check {} status", command.name))?
        {
            return Ok(Completion {
                status: Some(status),
                timed_out: false,
            });
        }
        if start.elapsed() > timeout {
            kill_process_tree(&mut child);
            let _ = child.wait();
            return Ok(Completion {
                status: None,
                timed_out: true,
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    match libc::pid_t::try_from(child.id()) {
        // SAFETY: killpg only sends a signal; the group id is the child's pid
        // because it was spawned with `process_group(0)`.
        Ok(pgid) if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 => {}
        _ => {
            let _ = child.kill();
        }
    }
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
}

fn create_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::File::create(path).with_context(|| format!("create {}", path.display()))
}

/// Child environment: the parent's variables with `overrides` applied.
///
/// Path-list variables already present keep their old value as a fallback
/// search path after the override.
pub fn build_env<I>(base: I, overrides: &BTreeMap<String, String>) -> BTreeMap<OsString, OsString>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut env: BTreeMap<OsString, OsString> = base.into_iter().collect();
    for (key, value) in overrides {
        let key_os = OsString::from(key);
        let merged = match env.get(&key_os) {
            Some(existing) if PATH_LIST_VARS.contains(&key.as_str()) && !existing.is_empty() => {
                prepend_path_list(value, existing)
            }
            _ => OsString::from(value),
        };
        env.insert(key_os, merged);
    }
    env
}

fn prepend_path_list(value: &str, existing: &OsStr) -> OsString {
    let mut paths: Vec<PathBuf> = std::env::split_paths(OsStr::new(value)).collect();
    paths.extend(std::env::split_paths(existing));
    std::env::join_paths(paths).unwrap_or_else(|_| {
        let mut joined = OsString::from(value);
        joined.push(if cfg!(windows) { ";" } else { ":" });
        joined.push(existing);
        joined
    })
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
