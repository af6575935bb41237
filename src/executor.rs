//! Compile-and-run of a single submission inside a throwaway directory.
//!
//! Each invocation owns a fresh directory under `work_root`. The directory is
//! removed when the owning [`Workspace`] is dropped, whichever way the invocation
//! ends, so fixed file names like `Main.java` never collide between requests.

use crate::config::Config;
use crate::error::Error;
use crate::language::{CommandLine, Language};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use uuid::Uuid;

pub const TIME_LIMIT_EXCEEDED: &str = "⏰ Time Limit Exceeded";
pub const COMPILE_TIME_LIMIT_EXCEEDED: &str = "⏰ Compilation Time Limit Exceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The program ran to the end. `None` when it was killed by a signal.
    Completed(Option<i32>),
    CompileError,
    CompileTimedOut,
    TimedOut,
}

/// What the caller gets back for every attempted invocation.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub output: String,
    pub error: String,
    #[serde(skip)]
    pub status: RunStatus,
}

impl ExecutionResult {
    fn compile_error(stderr: String) -> Self {
        ExecutionResult {
            output: String::new(),
            error: stderr,
            status: RunStatus::CompileError,
        }
    }

    fn compile_timed_out() -> Self {
        ExecutionResult {
            output: String::new(),
            error: COMPILE_TIME_LIMIT_EXCEEDED.to_string(),
            status: RunStatus::CompileTimedOut,
        }
    }

    fn timed_out() -> Self {
        ExecutionResult {
            output: String::new(),
            error: TIME_LIMIT_EXCEEDED.to_string(),
            status: RunStatus::TimedOut,
        }
    }
}

/// One request to build and run a submission.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub id: Uuid,
    pub code: String,
    pub language: Language,
    pub stdin: String,
}

impl Invocation {
    /// Fails with [`Error::UnsupportedLanguage`] before anything touches the disk.
    pub fn new(
        code: impl Into<String>,
        language: &str,
        stdin: impl Into<String>,
    ) -> Result<Self, Error> {
        Ok(Invocation {
            id: Uuid::new_v4(),
            code: code.into(),
            language: language.parse()?,
            stdin: stdin.into(),
        })
    }
}

/// Scratch directory of one invocation.
///
/// [`Workspace::remove`] deletes it off the async workers; dropping it without
/// calling `remove` deletes it inline. Removal errors are only logged.
struct Workspace {
    id: Uuid,
    path: PathBuf,
    dir: Option<TempDir>,
}

impl Workspace {
    async fn create(root: &Path, id: Uuid) -> Result<Self, Error> {
        let fail = |source| Error::Workspace {
            root: root.to_path_buf(),
            source,
        };
        fs::create_dir_all(root).await.map_err(fail)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", id))
            .tempdir_in(root)
            .map_err(fail)?;
        Ok(Workspace {
            id,
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(mut self) {
        if let Some(dir) = self.dir.take() {
            match tokio::task::spawn_blocking(move || dir.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.removal_failed(&e),
                Err(e) => self.removal_failed(&e),
            }
        }
    }

    fn removal_failed(&self, e: &dyn std::fmt::Display) {
        log::warn!(
            "invocation {}: could not remove {}: {}",
            self.id,
            self.path.display(),
            e
        );
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                self.removal_failed(&e);
            }
        }
    }
}

/// Outcome of [`Executor::prepare`].
pub enum Prepared {
    Ready(Program),
    /// Compilation failed or timed out; nothing will be run.
    Failed(ExecutionResult),
}

/// A built submission that can be run any number of times.
pub struct Program {
    workspace: Workspace,
    run: CommandLine,
    limit: Duration,
}

impl Program {
    pub fn id(&self) -> Uuid {
        self.workspace.id
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    /// Deletes the workspace on the blocking pool.
    pub async fn close(self) {
        self.workspace.remove().await;
    }

    /// Runs the program once. `stdin` is delivered with a trailing newline.
    pub async fn run(&self, stdin: &str) -> Result<ExecutionResult, Error> {
        let mut input = String::with_capacity(stdin.len() + 1);
        input.push_str(stdin);
        input.push('\n');

        let finished = run_process(
            &self.run,
            self.workspace.path(),
            Some(input.as_bytes()),
            self.limit,
        )
        .await?;

        Ok(match finished {
            Finished::TimedOut => ExecutionResult::timed_out(),
            Finished::Exited(output) => ExecutionResult {
                output: String::from_utf8_lossy(&output.stdout).into_owned(),
                error: String::from_utf8_lossy(&output.stderr).into_owned(),
                status: RunStatus::Completed(output.status.code()),
            },
        })
    }
}

pub struct Executor {
    config: Config,
}

impl Executor {
    pub fn new(config: Config) -> Self {
        Executor { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds the submission and runs it once with `invocation.stdin`.
    pub async fn execute(&self, invocation: &Invocation) -> Result<ExecutionResult, Error> {
        let started = Instant::now();
        log::info!(
            "invocation {}: running {} submission",
            invocation.id,
            invocation.language
        );

        let result = match self.prepare(invocation).await? {
            Prepared::Failed(result) => result,
            Prepared::Ready(program) => {
                let result = program.run(&invocation.stdin).await;
                program.close().await;
                result?
            }
        };

        log::info!(
            "invocation {}: {:?} after {:?}",
            invocation.id,
            result.status,
            started.elapsed()
        );
        Ok(result)
    }

    /// Writes the source into a fresh workspace and compiles it if the language needs it.
    pub async fn prepare(&self, invocation: &Invocation) -> Result<Prepared, Error> {
        let workspace = Workspace::create(&self.config.work_root, invocation.id).await?;
        let language = invocation.language;

        let source: PathBuf = workspace.path().join(language.source_file());
        fs::write(&source, &invocation.code)
            .await
            .map_err(|e| Error::WriteSource {
                path: source.clone(),
                source: e,
            })?;

        if let Some(compile) = language.compile_command(&self.config.toolchain) {
            let finished = run_process(
                &compile,
                workspace.path(),
                None,
                self.config.compile_limit(),
            )
            .await?;
            match finished {
                Finished::TimedOut => {
                    log::info!("invocation {}: compilation timed out", invocation.id);
                    workspace.remove().await;
                    return Ok(Prepared::Failed(ExecutionResult::compile_timed_out()));
                }
                Finished::Exited(output) if !output.status.success() => {
                    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                    workspace.remove().await;
                    return Ok(Prepared::Failed(ExecutionResult::compile_error(stderr)));
                }
                Finished::Exited(_) => {}
            }
        }

        let run = language
            .run_command(&self.config.toolchain, workspace.path())
            .wrapped_in(&self.config.sandbox);
        Ok(Prepared::Ready(Program {
            workspace,
            run,
            limit: self.config.run_limit(),
        }))
    }
}

enum Finished {
    Exited(Output),
    TimedOut,
}

/// Process group led by a spawned command. Every member is killed on drop.
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            match killpg(pgid, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => log::warn!("could not kill process group {}: {}", pgid, e),
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Spawns `cmd` in `cwd` as the leader of a new process group, feeds it `input`
/// and collects its output within `limit`.
///
/// The whole group is killed once the leader exits or the limit expires, so
/// neither a compiler's helper processes nor anything the submission forked
/// outlives the step.
async fn run_process(
    cmd: &CommandLine,
    cwd: &Path,
    input: Option<&[u8]>,
    limit: Duration,
) -> Result<Finished, Error> {
    log::debug!("spawning `{}` in {}", cmd, cwd.display());

    let mut child = Command::new(&cmd.program)
        .args(&cmd.args)
        .current_dir(cwd)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| Error::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

    let mut group = ProcessGroup {
        pgid: child.id().map(|id| Pid::from_raw(id as i32)),
    };

    let pipe = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let feed = async move {
        if let (Some(mut pipe), Some(bytes)) = (pipe, input) {
            match pipe.write_all(bytes).await {
                // the program exited without reading everything
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                other => other?,
            }
        }
        Ok::<_, std::io::Error>(())
    };
    // Background processes still holding the output pipes die with the group,
    // which lets the drains reach EOF.
    let reap = async {
        let status = child.wait().await;
        group.kill();
        status
    };
    let exchange = async {
        let (fed, status, stdout, stderr) =
            tokio::join!(feed, reap, drain(stdout), drain(stderr));
        fed?;
        Ok::<_, std::io::Error>(Output {
            status: status?,
            stdout: stdout?,
            stderr: stderr?,
        })
    };

    let finished = match tokio::time::timeout(limit, exchange).await {
        Ok(Ok(output)) => Ok(Finished::Exited(output)),
        Ok(Err(source)) => Err(Error::Io {
            program: cmd.program.clone(),
            source,
        }),
        Err(_) => Ok(Finished::TimedOut),
    };
    group.kill();
    finished
}
