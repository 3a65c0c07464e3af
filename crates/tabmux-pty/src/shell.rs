//! Shell resolution: which executable and flags a new session launches.

use std::{
    fmt,
    future::Future,
    path::{Component, Path, PathBuf},
    process::Stdio,
    sync::{Arc, OnceLock},
    thread,
    time::Duration,
};

use tabmux_core::ShellSpec;
use tokio::{
    process::Command,
    runtime::{Builder, Handle, Runtime},
};

/// Environment variable overriding the shell's invocation flags.
pub const SHELL_EXECUTE_FLAGS: &str = "SHELL_EXECUTE_FLAGS";

/// Flags used when `SHELL_EXECUTE_FLAGS` is not set.
const DEFAULT_FLAGS: &str = "--login";

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Host platform family, as far as shell selection cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Unix,
}

impl Platform {
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }
}

/// Snapshot of the environment variables shell resolution reads.
///
/// Empty `SHELL` / `COMSPEC` values are treated as unset. An empty
/// `SHELL_EXECUTE_FLAGS` is kept and means "no flags".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellVars {
    pub shell: Option<String>,
    pub comspec: Option<String>,
    pub execute_flags: Option<String>,
}

impl ShellVars {
    /// Read the variables from the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the variables through `var`.
    #[must_use]
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        Self {
            shell: non_empty("SHELL"),
            comspec: non_empty("COMSPEC"),
            execute_flags: var(SHELL_EXECUTE_FLAGS),
        }
    }
}

type Probe = Arc<dyn Fn() -> Option<String> + Send + Sync>;
type Lookup = Arc<dyn Fn(&str) -> Option<PathBuf> + Send + Sync>;

/// Decides the shell for new sessions.
///
/// Resolution order:
/// 1. The login shell reported by a one-shot `echo $SHELL` subprocess, if it
///    looks like an absolute path in a `bin` directory.
/// 2. A per-platform fallback chain over `SHELL`, `COMSPEC` and fixed defaults.
///
/// Arguments come from `SHELL_EXECUTE_FLAGS`, defaulting to `--login`.
#[derive(Clone)]
pub struct ShellResolver {
    platform: Platform,
    vars: ShellVars,
    probe: Probe,
    lookup: Lookup,
}

impl fmt::Debug for ShellResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellResolver")
            .field("platform", &self.platform)
            .field("vars", &self.vars)
            .finish_non_exhaustive()
    }
}

impl Default for ShellResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ShellResolver {
    /// Resolver for the current platform and process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            platform: Platform::current(),
            vars: ShellVars::from_env(),
            probe: Arc::new(probe_login_shell),
            lookup: Arc::new(resolve_executable_path),
        }
    }

    #[must_use]
    pub const fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub fn with_vars(mut self, vars: ShellVars) -> Self {
        self.vars = vars;
        self
    }

    /// Replace the login-shell probe.
    #[must_use]
    pub fn with_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.probe = Arc::new(probe);
        self
    }

    /// Replace the `PATH` lookup used on Windows.
    #[must_use]
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<PathBuf> + Send + Sync + 'static,
    {
        self.lookup = Arc::new(lookup);
        self
    }

    /// Resolve the shell. Always returns something launchable.
    #[must_use]
    pub fn resolve(&self) -> ShellSpec {
        let spec = ShellSpec {
            executable: self.resolve_executable(),
            args: self.resolve_args(),
        };
        tracing::debug!(shell = %spec, platform = ?self.platform, "Resolved shell");
        spec
    }

    /// Pick the shell executable.
    #[must_use]
    pub fn resolve_executable(&self) -> String {
        if let Some(shell) = (self.probe)().filter(|s| looks_like_system_shell(s)) {
            return shell;
        }

        match self.platform {
            Platform::MacOs => self
                .vars
                .shell
                .clone()
                .unwrap_or_else(|| "/bin/bash".to_string()),
            Platform::Windows => (self.lookup)("bash")
                .map(|path| path.to_string_lossy().into_owned())
                .or_else(|| self.vars.shell.clone())
                .or_else(|| self.vars.comspec.clone())
                .unwrap_or_else(|| "cmd.exe".to_string()),
            Platform::Unix => self
                .vars
                .shell
                .clone()
                .unwrap_or_else(|| "/bin/sh".to_string()),
        }
    }

    /// Pick the shell arguments.
    #[must_use]
    pub fn resolve_args(&self) -> Vec<String> {
        split_flags(self.vars.execute_flags.as_deref().unwrap_or(DEFAULT_FLAGS))
    }
}

/// Resolve the shell for the current platform and environment.
#[must_use]
pub fn resolve_shell() -> ShellSpec {
    ShellResolver::from_env().resolve()
}

/// Split a flag string on whitespace, dropping empty tokens.
#[must_use]
pub fn split_flags(flags: &str) -> Vec<String> {
    flags.split_whitespace().map(str::to_owned).collect()
}

/// Whether `candidate` is an absolute path inside a `bin` or `sbin` directory.
#[must_use]
pub fn looks_like_system_shell(candidate: &str) -> bool {
    let path = Path::new(candidate);
    if !(candidate.starts_with('/') || path.is_absolute()) {
        return false;
    }
    path.parent().is_some_and(|dir| {
        dir.components().any(|c| {
            matches!(c, Component::Normal(name) if name == "bin" || name == "sbin")
        })
    })
}

/// Ask a subshell for `$SHELL`.
///
/// Runs exactly once per call and is bounded by a timeout. A failure, a
/// timeout, a non-zero exit or empty output yields `None`.
#[must_use]
pub fn probe_login_shell() -> Option<String> {
    if cfg!(windows) {
        capture_output("cmd", &["/C", "echo %SHELL%"], PROBE_TIMEOUT)
    } else {
        capture_output("sh", &["-c", "echo $SHELL"], PROBE_TIMEOUT)
    }
}

/// Run `program` once and return its trimmed stdout, giving up after
/// `timeout`. The child is killed if it outlives the timeout.
#[must_use]
pub fn capture_output(program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    block_on(read_command_output(program, args, timeout)).flatten()
}

async fn read_command_output(program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::debug!(?err, program, "Failed to probe login shell");
            return None;
        }
    };

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            tracing::debug!(?err, program, "Failed to wait for login shell probe");
            return None;
        }
        Err(_) => {
            tracing::warn!(
                program,
                timeout_ms = timeout.as_millis(),
                "Timed out probing login shell"
            );
            return None;
        }
    };

    if !output.status.success() {
        tracing::debug!(program, status = ?output.status, "Login shell probe failed");
        return None;
    }

    let stdout = String::from_utf8(output.stdout).ok()?;
    let stdout = stdout.trim();
    (!stdout.is_empty()).then(|| stdout.to_string())
}

/// Run a future to completion from synchronous code.
///
/// The future always runs on a private current-thread runtime. Inside another
/// runtime it is driven from a scoped thread, since `Runtime::block_on` may
/// not nest. Returns `None` if the runtime could not be built or the thread
/// panicked.
fn block_on<F>(future: F) -> Option<F::Output>
where
    F: Future + Send,
    F::Output: Send,
{
    static RT: OnceLock<Option<Runtime>> = OnceLock::new();
    let runtime = RT
        .get_or_init(|| {
            Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|err| tracing::warn!(?err, "Failed to create probe runtime"))
                .ok()
        })
        .as_ref()?;

    if Handle::try_current().is_ok() {
        thread::scope(|s| s.spawn(|| runtime.block_on(future)).join().ok())
    } else {
        Some(runtime.block_on(future))
    }
}

/// Look an executable up on `PATH`.
#[must_use]
pub fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }
    let path = Path::new(executable);
    if path.is_absolute() && path.is_file() {
        return Some(path.to_path_buf());
    }
    which::which(executable).ok()
}
