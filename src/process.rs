//! Spawning external programs: native build tools, package managers, VCS.
//!
//! A [`Subprocess`] owns the program, its arguments and a normalized
//! environment. Every way of running it ends in the same exit
//! classification: the program could not be found, it exited non-zero, or
//! it was killed by a signal. Anything else is success.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::debug;

/// Separator between entries of `PATH`.
#[cfg(windows)]
pub const PATH_DELIMITER: char = ';';
#[cfg(not(windows))]
pub const PATH_DELIMITER: char = ':';

/// How a finished (or never started) subprocess failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubprocessErrorKind {
    /// The program could not be started because it does not exist.
    CommandNotFound,
    /// The program exited on its own with a non-zero status.
    NonZeroExit(i32),
    /// The program was terminated by a signal, e.g. `SIGINT`.
    SignalExit(String),
}

/// A classified subprocess failure.
#[derive(Debug, Clone, Error)]
pub struct SubprocessError {
    pub kind: SubprocessErrorKind,
    /// Display rendering of the command line (see [`Subprocess::bashify`]).
    pub command: String,
    /// Combined stdout and stderr, when the output was being captured.
    pub output: Option<String>,
}

impl SubprocessError {
    /// The exit code of a [`SubprocessErrorKind::NonZeroExit`].
    pub fn exit_code(&self) -> Option<i32> {
        match self.kind {
            SubprocessErrorKind::NonZeroExit(code) => Some(code),
            _ => None,
        }
    }

    /// The signal name of a [`SubprocessErrorKind::SignalExit`].
    pub fn signal(&self) -> Option<&str> {
        match &self.kind {
            SubprocessErrorKind::SignalExit(signal) => Some(signal),
            _ => None,
        }
    }
}

impl fmt::Display for SubprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SubprocessErrorKind::CommandNotFound => {
                write!(f, "Command not found: {}", self.command)
            }
            SubprocessErrorKind::NonZeroExit(code) => {
                write!(f, "Command `{}` exited with exit code {code}", self.command)
            }
            SubprocessErrorKind::SignalExit(signal) => {
                write!(f, "Command `{}` was killed by signal {signal}", self.command)
            }
        }
    }
}

/// Why running a [`Subprocess`] did not succeed.
///
/// [`ProcessError::Failed`] is an expected, classified outcome; `Io` means
/// something went wrong talking to the operating system.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program is missing, exited non-zero or was killed.
    #[error(transparent)]
    Failed(#[from] SubprocessError),
    /// Unclassified I/O failure while spawning or talking to the child.
    #[error("I/O error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    /// The classified failure, unless this is an I/O error.
    pub fn as_failure(&self) -> Option<&SubprocessError> {
        match self {
            ProcessError::Failed(failure) => Some(failure),
            ProcessError::Io { .. } => None,
        }
    }

    /// `true` when the program could not be found.
    pub fn is_command_not_found(&self) -> bool {
        matches!(
            self.as_failure(),
            Some(SubprocessError {
                kind: SubprocessErrorKind::CommandNotFound,
                ..
            })
        )
    }
}

/// Where and with which environment a [`Subprocess`] runs.
#[derive(Debug, Clone, Default)]
pub struct SubprocessOptions {
    /// Working directory; the parent's when `None`.
    pub cwd: Option<PathBuf>,
    /// `None` inherits the current process environment. `Some` replaces it
    /// entirely; only `PATH` is added back when missing.
    pub env: Option<HashMap<String, String>>,
}

/// Display switches for [`Subprocess::bashify`].
#[derive(Debug, Clone, Copy)]
pub struct BashifyOptions {
    /// Show only the basename of the program.
    pub mask_program: bool,
    /// Show only the basename of the first argument.
    pub mask_first_arg: bool,
    /// Drop the program so the first argument reads as the program.
    pub shift_program: bool,
}

impl Default for BashifyOptions {
    fn default() -> Self {
        Self {
            mask_program: true,
            mask_first_arg: false,
            shift_program: false,
        }
    }
}

/// An external program ready to be run.
#[derive(Debug, Clone)]
pub struct Subprocess {
    /// Name shown to users; the basename when `path` is set.
    name: String,
    /// Full path when the program was given with a path separator.
    path: Option<PathBuf>,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: HashMap<String, String>,
}

impl Subprocess {
    /// Prepare `name` with `args`. The program is not started yet.
    ///
    /// A `name` containing a path separator is executed by that path and
    /// displayed by its basename. `PATH` in the effective environment has
    /// `~` expanded to the home directory.
    pub fn new<I, S>(name: impl Into<String>, args: I, options: SubprocessOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let masked = mask_arg(&name);
        let (name, path) = if masked != name {
            (masked.to_string(), Some(PathBuf::from(&name)))
        } else {
            (name, None)
        };

        let SubprocessOptions { cwd, env } = options;
        let env = prepare_env(env, dirs::home_dir().as_deref());

        Self {
            name,
            path,
            args: args.into_iter().map(Into::into).collect(),
            cwd,
            env,
        }
    }

    /// The display name of the program.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What is actually executed: the full path when one was given.
    pub fn program(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(&self.name))
    }

    /// Arguments passed after the program.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The effective environment; always contains `PATH`.
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Render a display-only command line.
    ///
    /// The result is for logs and error messages and is never re-parsed.
    pub fn bashify(&self, options: BashifyOptions) -> String {
        let program = match &self.path {
            Some(path) => path.to_string_lossy().into_owned(),
            None => self.name.clone(),
        };
        let mut args: Vec<String> = std::iter::once(program)
            .chain(self.args.iter().cloned())
            .collect();

        if options.shift_program {
            args.remove(0);
        }
        if options.mask_program {
            if let Some(first) = args.first_mut() {
                *first = mask_arg(first).to_string();
            }
        }
        if options.mask_first_arg {
            if let Some(second) = args.get_mut(1) {
                *second = mask_arg(second).to_string();
            }
        }

        args.iter()
            .map(|arg| bashify_arg(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn display(&self) -> String {
        self.bashify(BashifyOptions::default())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(self.program());
        cmd.args(&self.args).env_clear().envs(&self.env);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    fn spawn_command(&self, mut cmd: Command) -> Result<Child, ProcessError> {
        debug!(command = %self.display(), cwd = ?self.cwd, "spawning subprocess");
        cmd.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                self.failure(SubprocessErrorKind::CommandNotFound, None)
            } else {
                self.io_error(e)
            }
        })
    }

    /// Start the program with inherited stdio and hand back the live child.
    pub fn spawn(&self) -> Result<RunningProcess, ProcessError> {
        let child = self.spawn_command(self.command())?;
        Ok(RunningProcess {
            child,
            command: self.display(),
        })
    }

    /// Start the program with inherited stdio and wait for it to finish.
    pub async fn run(&self) -> Result<(), ProcessError> {
        self.spawn()?.wait().await
    }

    /// Capture stdout. On failure the error carries stdout and stderr
    /// combined in arrival order.
    pub async fn output(&self) -> Result<String, ProcessError> {
        let captured = self.capture().await?;
        match classify(captured.status) {
            None => Ok(String::from_utf8_lossy(&captured.stdout).into_owned()),
            Some(kind) => Err(self.failure(kind, Some(captured.combined_text()))),
        }
    }

    /// Capture stdout and stderr interleaved in arrival order.
    pub async fn combined_output(&self) -> Result<String, ProcessError> {
        let captured = self.capture().await?;
        let combined = captured.combined_text();
        match classify(captured.status) {
            None => Ok(combined),
            Some(kind) => Err(self.failure(kind, Some(combined))),
        }
    }

    async fn capture(&self) -> Result<Captured, ProcessError> {
        let mut cmd = self.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = self.spawn_command(cmd)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let combined = Mutex::new(Vec::new());

        let (stdout, stderr, status) = tokio::join!(
            drain(stdout, &combined),
            drain(stderr, &combined),
            child.wait()
        );
        let stdout = stdout.map_err(|e| self.io_error(e))?;
        stderr.map_err(|e| self.io_error(e))?;
        let status = status.map_err(|e| self.io_error(e))?;

        debug!(command = %self.display(), %status, "subprocess finished");
        Ok(Captured {
            status,
            stdout,
            combined: combined.into_inner(),
        })
    }

    fn failure(&self, kind: SubprocessErrorKind, output: Option<String>) -> ProcessError {
        ProcessError::Failed(SubprocessError {
            kind,
            command: self.display(),
            output,
        })
    }

    fn io_error(&self, source: io::Error) -> ProcessError {
        ProcessError::Io {
            command: self.display(),
            source,
        }
    }
}

/// A spawned child whose stdio is inherited from the parent.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    command: String,
}

impl RunningProcess {
    /// The OS process id, while the child is still running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// The live child, e.g. to send it a signal.
    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Wait for the child to exit and classify how it ended.
    pub async fn wait(mut self) -> Result<(), ProcessError> {
        let status = self.child.wait().await.map_err(|source| ProcessError::Io {
            command: self.command.clone(),
            source,
        })?;
        debug!(command = %self.command, %status, "subprocess finished");
        match classify(status) {
            None => Ok(()),
            Some(kind) => Err(ProcessError::Failed(SubprocessError {
                kind,
                command: self.command,
                output: None,
            })),
        }
    }
}

struct Captured {
    status: ExitStatus,
    stdout: Vec<u8>,
    combined: Vec<u8>,
}

impl Captured {
    fn combined_text(&self) -> String {
        String::from_utf8_lossy(&self.combined).into_owned()
    }
}

/// Read `reader` to the end, appending every chunk to `combined` as it
/// arrives and returning this stream's own bytes.
async fn drain<R>(reader: Option<R>, combined: &Mutex<Vec<u8>>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut own = Vec::new();
    let Some(mut reader) = reader else {
        return Ok(own);
    };
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(own);
        }
        own.extend_from_slice(&buf[..n]);
        combined.lock().extend_from_slice(&buf[..n]);
    }
}

/// Map an exit status to a failure kind; `None` means success.
fn classify(status: ExitStatus) -> Option<SubprocessErrorKind> {
    if status.success() {
        return None;
    }
    if let Some(code) = status.code() {
        return Some(SubprocessErrorKind::NonZeroExit(code));
    }
    Some(SubprocessErrorKind::SignalExit(signal_name(status)))
}

#[cfg(unix)]
fn signal_name(status: ExitStatus) -> String {
    use nix::sys::signal::Signal;
    use std::os::unix::process::ExitStatusExt;

    match status.signal() {
        Some(signal) => Signal::try_from(signal)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|_| format!("SIG{signal}")),
        None => "UNKNOWN".to_string(),
    }
}

#[cfg(not(unix))]
fn signal_name(_status: ExitStatus) -> String {
    "UNKNOWN".to_string()
}

/// The final path segment of `arg`, or `arg` itself when it has none.
///
/// Windows accepts both `\` and `/` as separators.
fn mask_arg(arg: &str) -> &str {
    match arg.rfind(is_path_separator) {
        Some(i) => &arg[i + 1..],
        None => arg,
    }
}

#[cfg(windows)]
fn is_path_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

#[cfg(not(windows))]
fn is_path_separator(c: char) -> bool {
    c == '/'
}

fn bashify_arg(arg: &str) -> String {
    if arg.contains(char::is_whitespace) {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// Expand a leading `~` in one `PATH` entry.
pub fn expand_tilde(entry: &str, home: &Path) -> String {
    if entry == "~" {
        home.to_string_lossy().into_owned()
    } else if let Some(rest) = entry.strip_prefix("~/") {
        home.join(rest).to_string_lossy().into_owned()
    } else {
        entry.to_string()
    }
}

/// Expand `~` in every entry of a `PATH` value. Spawning without a shell
/// never performs this expansion itself.
pub fn expand_path_list(path: &str, home: &Path) -> String {
    path.split(PATH_DELIMITER)
        .map(|entry| expand_tilde(entry, home))
        .collect::<Vec<_>>()
        .join(&PATH_DELIMITER.to_string())
}

fn prepare_env(
    explicit: Option<HashMap<String, String>>,
    home: Option<&Path>,
) -> HashMap<String, String> {
    let mut env = match explicit {
        Some(env) => env,
        None => std::env::vars().collect(),
    };
    let path = match env.get("PATH") {
        Some(path) => path.clone(),
        None => std::env::var("PATH").unwrap_or_default(),
    };
    let path = match home {
        Some(home) => expand_path_list(&path, home),
        None => path,
    };
    env.insert("PATH".to_string(), path);
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Subprocess {
        Subprocess::new("sh", ["-c", script], SubprocessOptions::default())
    }

    #[test]
    fn test_bashify_quotes_whitespace() {
        let p = Subprocess::new("cmd", ["foo bar"], SubprocessOptions::default());
        assert_eq!(p.bashify(BashifyOptions::default()), r#"cmd "foo bar""#);
    }

    #[test]
    fn test_bashify_escapes_inner_quotes() {
        let p = Subprocess::new("cmd", [r#"foo "bar" baz"#], SubprocessOptions::default());
        assert_eq!(
            p.bashify(BashifyOptions::default()),
            r#"cmd "foo \"bar\" baz""#
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_full_path_displays_basename_but_executes_path() {
        let p = Subprocess::new("/usr/local/bin/npm", ["install"], SubprocessOptions::default());
        assert_eq!(p.name(), "npm");
        assert_eq!(p.program(), Path::new("/usr/local/bin/npm"));
        assert_eq!(p.bashify(BashifyOptions::default()), "npm install");

        let unmasked = BashifyOptions {
            mask_program: false,
            ..BashifyOptions::default()
        };
        assert_eq!(p.bashify(unmasked), "/usr/local/bin/npm install");
    }

    #[test]
    #[cfg(unix)]
    fn test_bashify_shift_and_mask_first_arg() {
        let p = Subprocess::new(
            "/usr/bin/node",
            ["/opt/stratus/bin/stratus", "build"],
            SubprocessOptions::default(),
        );
        let masked = BashifyOptions {
            mask_first_arg: true,
            ..BashifyOptions::default()
        };
        assert_eq!(p.bashify(masked), "node stratus build");

        let shifted = BashifyOptions {
            shift_program: true,
            ..BashifyOptions::default()
        };
        assert_eq!(p.bashify(shifted), "stratus build");
    }

    #[test]
    #[cfg(unix)]
    fn test_path_tilde_expansion() {
        let home = Path::new("/home/dev");
        assert_eq!(
            expand_path_list("~/bin:/usr/bin:~", home),
            "/home/dev/bin:/usr/bin:/home/dev"
        );
        // a tilde in the middle of an entry is left alone
        assert_eq!(expand_path_list("/opt/~/bin", home), "/opt/~/bin");
    }

    #[test]
    #[cfg(unix)]
    fn test_path_tilde_expansion_is_idempotent() {
        let home = Path::new("/home/dev");
        let once = expand_path_list("~/.cargo/bin:~/bin:/usr/bin", home);
        assert_eq!(expand_path_list(&once, home), once);
    }

    #[test]
    #[cfg(unix)]
    fn test_explicit_empty_env_only_gets_path() {
        let env = prepare_env(Some(HashMap::new()), Some(Path::new("/home/dev")));
        assert_eq!(env.len(), 1);
        assert!(env.contains_key("PATH"));
    }

    #[test]
    #[cfg(unix)]
    fn test_explicit_env_path_is_expanded() {
        let explicit = HashMap::from([
            ("PATH".to_string(), "~/bin:/bin".to_string()),
            ("FOO".to_string(), "bar".to_string()),
        ]);
        let env = prepare_env(Some(explicit), Some(Path::new("/home/dev")));
        assert_eq!(env.get("PATH").map(String::as_str), Some("/home/dev/bin:/bin"));
        assert_eq!(env.get("FOO").map(String::as_str), Some("bar"));
    }

    #[tokio::test]
    async fn test_missing_program_is_command_not_found() {
        let p = Subprocess::new(
            "stratus-definitely-not-a-real-program",
            Vec::<String>::new(),
            SubprocessOptions::default(),
        );
        let err = p.run().await.unwrap_err();
        assert!(err.is_command_not_found(), "got {err:?}");

        let err = p.output().await.unwrap_err();
        assert!(err.is_command_not_found(), "got {err:?}");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_exit_one_is_non_zero_exit() {
        let err = sh("exit 1").run().await.unwrap_err();
        let failure = err.as_failure().expect("classified failure");
        assert_eq!(failure.kind, SubprocessErrorKind::NonZeroExit(1));
        assert_eq!(failure.exit_code(), Some(1));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_killed_by_sigint_is_signal_exit() {
        let err = sh("kill -INT $$").run().await.unwrap_err();
        let failure = err.as_failure().expect("classified failure");
        assert_eq!(failure.signal(), Some("SIGINT"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_zero_exit_is_success_even_with_stderr() {
        let out = sh("echo warning 1>&2; echo done").output().await.unwrap();
        assert_eq!(out, "done\n");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_output_failure_carries_combined_output() {
        let err = sh("echo out; sleep 0.2; echo err 1>&2; exit 3")
            .output()
            .await
            .unwrap_err();
        let failure = err.as_failure().expect("classified failure");
        assert_eq!(failure.exit_code(), Some(3));
        assert_eq!(failure.output.as_deref(), Some("out\nerr\n"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_combined_output_keeps_arrival_order() {
        let out = sh("echo one 1>&2; sleep 0.2; echo two; sleep 0.2; echo three 1>&2")
            .combined_output()
            .await
            .unwrap();
        assert_eq!(out, "one\ntwo\nthree\n");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_combined_output_failure_carries_same_text() {
        let err = sh("echo a; sleep 0.2; echo b 1>&2; exit 2")
            .combined_output()
            .await
            .unwrap_err();
        let failure = err.as_failure().expect("classified failure");
        assert_eq!(failure.exit_code(), Some(2));
        assert_eq!(failure.output.as_deref(), Some("a\nb\n"));
    }

    #[test]
    fn test_mask_arg_takes_last_segment() {
        assert_eq!(mask_arg("/usr/bin/node"), "node");
        assert_eq!(mask_arg("node"), "node");
    }

    #[test]
    #[cfg(windows)]
    fn test_mask_arg_accepts_forward_slash_on_windows() {
        assert_eq!(mask_arg(r"C:\tools\npm.cmd"), "npm.cmd");
        assert_eq!(mask_arg("C:/tools/npm.cmd"), "npm.cmd");
        let p = Subprocess::new("C:/tools/npm.cmd", ["install"], SubprocessOptions::default());
        assert_eq!(p.name(), "npm.cmd");
        assert_eq!(p.program(), Path::new("C:/tools/npm.cmd"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_explicit_env_is_not_leaked_from_parent() {
        let options = SubprocessOptions {
            cwd: None,
            env: Some(HashMap::from([("ONLY".to_string(), "me".to_string())])),
        };
        let p = Subprocess::new("sh", ["-c", "echo \"$ONLY:${HOME:-unset}\""], options);
        assert_eq!(p.output().await.unwrap(), "me:unset\n");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_cwd_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let options = SubprocessOptions {
            cwd: Some(dir.path().to_path_buf()),
            env: None,
        };
        let out = Subprocess::new("pwd", Vec::<String>::new(), options)
            .output()
            .await
            .unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(Path::new(out.trim()).canonicalize().unwrap(), expected);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_spawn_exposes_child_before_completion() {
        let mut running = sh("exit 0").spawn().unwrap();
        assert!(running.id().is_some());
        let _ = running.child_mut();
        running.wait().await.unwrap();
    }
}
