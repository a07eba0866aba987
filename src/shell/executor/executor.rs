use std::env;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process;

use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{dup2, execv, fork, pipe, ForkResult, Pid};

use super::builtins::BuiltinRegistry;
use crate::shell::error::ShellError;
use crate::shell::parser::{Command, Pipeline};
use crate::utils::path::find_executable;

const EXIT_KEYWORD: &str = "exit";
const CD_KEYWORD: &str = "cd";

/// What the read-eval loop should do after a line has been executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSignal {
    Continue,
    Terminate,
}

enum Program {
    Builtin,
    External(CString),
    NotFound,
}

/// A pipeline stage resolved and ready to fork: argv built, files opened.
struct Stage {
    name: String,
    args: Vec<String>,
    argv: Vec<CString>,
    program: Program,
    stdin: Option<File>,
    stdout: Option<File>,
}

pub struct Executor {
    shell_name: String,
    search_path: Vec<PathBuf>,
    builtins: BuiltinRegistry,
}

impl Executor {
    pub fn new(shell_name: &str, search_path: Vec<PathBuf>, builtins: BuiltinRegistry) -> Self {
        Self {
            shell_name: shell_name.to_string(),
            search_path,
            builtins,
        }
    }

    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }

    pub fn execute(&self, pipeline: &Pipeline) -> Result<ExitSignal, ShellError> {
        if pipeline.is_blank() {
            return Ok(ExitSignal::Continue);
        }

        let head = &pipeline.head;
        match head.name.as_str() {
            EXIT_KEYWORD => return Ok(ExitSignal::Terminate),
            CD_KEYWORD => {
                change_directory(head.args.first().map(String::as_str))?;
                return Ok(ExitSignal::Continue);
            }
            _ => {}
        }

        validate(pipeline)?;
        let cwd = env::current_dir()?;
        let stages = pipeline
            .stages()
            .map(|command| self.prepare(command, &cwd))
            .collect::<Result<Vec<_>, _>>()?;

        let (children, spawn_error) = self.spawn(stages);
        if pipeline.background() {
            debug!("started in background: {:?}", children);
        } else {
            wait_foreground(&children);
        }
        match spawn_error {
            Some(e) => Err(e),
            None => Ok(ExitSignal::Continue),
        }
    }

    /// Collects finished background children so they do not linger as zombies.
    pub fn reap_background(&self) {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(_) => break,
                Ok(status) => debug!("reaped background child: {:?}", status),
            }
        }
    }

    fn prepare(&self, command: &Command, cwd: &Path) -> Result<Stage, ShellError> {
        let argv = command
            .argv()
            .into_iter()
            .map(|arg| CString::new(arg).map_err(|_| ShellError::NulByte(command.name.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let program = if self.builtins.has(&command.name) {
            Program::Builtin
        } else {
            match find_executable(&command.name, &self.search_path, cwd) {
                Some(path) => Program::External(path_to_cstring(&path, &command.name)?),
                None => Program::NotFound,
            }
        };

        let stdin = match &command.redirect_in {
            Some(path) => Some(File::open(path).map_err(|source| ShellError::Redirect {
                path: path.clone(),
                source,
            })?),
            None => None,
        };
        let stdout = match command.output_target() {
            Some((path, append)) => Some(open_output(path, append)?),
            None => None,
        };

        Ok(Stage {
            name: command.name.clone(),
            args: command.args.clone(),
            argv,
            program,
            stdin,
            stdout,
        })
    }

    /// Forks one child per stage, each stage's stdout feeding the next
    /// stage's stdin. Returns every child that was started, plus the error
    /// that stopped the chain early, if any.
    fn spawn(&self, stages: Vec<Stage>) -> (Vec<Pid>, Option<ShellError>) {
        let mut children = Vec::with_capacity(stages.len());
        let mut upstream: Option<OwnedFd> = None;
        let count = stages.len();

        for (index, stage) in stages.into_iter().enumerate() {
            let downstream = if index + 1 < count {
                match cloexec_pipe() {
                    Ok(ends) => Some(ends),
                    Err(e) => return (children, Some(ShellError::Spawn(e))),
                }
            } else {
                None
            };
            if let Err(e) = io::stdout().flush() {
                return (children, Some(ShellError::Io(e)));
            }

            // SAFETY: the child only rewires descriptors, then execs or exits.
            match unsafe { fork() } {
                Ok(ForkResult::Child) => {
                    let stdin = upstream.as_ref().map(AsRawFd::as_raw_fd);
                    let stdout = downstream.as_ref().map(|(_, write)| write.as_raw_fd());
                    process::exit(self.run_child(&stage, stdin, stdout));
                }
                Ok(ForkResult::Parent { child }) => {
                    debug!("spawned {} as pid {}", stage.name, child);
                    children.push(child);
                    // Keep only the read end; dropping the write end lets
                    // the next stage see end-of-stream.
                    upstream = downstream.map(|(read, _write)| read);
                }
                Err(e) => return (children, Some(ShellError::Spawn(e))),
            }
        }
        (children, None)
    }

    /// Runs in the forked child and returns its exit status.
    fn run_child(&self, stage: &Stage, pipe_in: Option<RawFd>, pipe_out: Option<RawFd>) -> i32 {
        let stdin = pipe_in.or(stage.stdin.as_ref().map(AsRawFd::as_raw_fd));
        let stdout = pipe_out.or(stage.stdout.as_ref().map(AsRawFd::as_raw_fd));
        for (fd, target) in [(stdin, libc::STDIN_FILENO), (stdout, libc::STDOUT_FILENO)] {
            if let Some(fd) = fd {
                if let Err(e) = dup2(fd, target) {
                    eprintln!("-{}: {}: dup2: {}", self.shell_name, stage.name, e);
                    return 1;
                }
            }
        }

        match &stage.program {
            Program::Builtin => {
                let code = match self.builtins.invoke(&stage.name, &stage.args) {
                    Ok(()) => 0,
                    Err(e) => {
                        eprintln!("-{}: {}", self.shell_name, e);
                        1
                    }
                };
                let _ = io::stdout().flush();
                code
            }
            Program::External(path) => {
                // execv only returns on failure.
                let Err(e) = execv(path, stage.argv.as_slice());
                eprintln!("-{}: {}: {}", self.shell_name, stage.name, e);
                126
            }
            Program::NotFound => {
                eprintln!("-{}: {}: command not found", self.shell_name, stage.name);
                127
            }
        }
    }
}

fn change_directory(target: Option<&str>) -> Result<(), ShellError> {
    let target = target.unwrap_or("~");
    let expanded = shellexpand::tilde(target);
    debug!("cd {}", expanded);
    env::set_current_dir(expanded.as_ref()).map_err(|source| ShellError::ChangeDirectory {
        target: target.to_string(),
        source,
    })
}

/// Rejects pipelines the executor cannot realise faithfully.
fn validate(pipeline: &Pipeline) -> Result<(), ShellError> {
    let piped = pipeline.len() > 1;
    for stage in pipeline.stages() {
        if stage.name.is_empty() {
            return Err(ShellError::MissingPipeStage);
        }
        let targets = [&stage.redirect_in, &stage.redirect_out, &stage.redirect_append];
        if targets.iter().any(|t| t.as_deref() == Some("")) {
            return Err(ShellError::EmptyRedirect {
                command: stage.name.clone(),
            });
        }
        if stage.redirect_out.is_some() && stage.redirect_append.is_some() {
            return Err(ShellError::ConflictingOutputRedirect {
                command: stage.name.clone(),
            });
        }
        if piped && stage.redirect_in.is_some() {
            return Err(ShellError::MisplacedRedirect {
                command: stage.name.clone(),
                kind: "input",
            });
        }
        if stage.next.is_some() && stage.output_target().is_some() {
            return Err(ShellError::MisplacedRedirect {
                command: stage.name.clone(),
                kind: "output",
            });
        }
    }
    Ok(())
}

fn open_output(path: &str, append: bool) -> Result<File, ShellError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).mode(0o644);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    options.open(path).map_err(|source| ShellError::Redirect {
        path: path.to_string(),
        source,
    })
}

fn path_to_cstring(path: &Path, name: &str) -> Result<CString, ShellError> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| ShellError::NulByte(name.to_string()))
}

fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    let (read, write) = pipe()?;
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}

/// Blocks until every child of a foreground pipeline has exited, been killed
/// or been stopped.
fn wait_foreground(children: &[Pid]) {
    for &pid in children {
        loop {
            match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
                Ok(WaitStatus::Exited(pid, code)) => {
                    debug!("pid {} exited with {}", pid, code);
                    break;
                }
                Ok(WaitStatus::Signaled(pid, signal, _)) => {
                    debug!("pid {} killed by {}", pid, signal);
                    break;
                }
                Ok(WaitStatus::Stopped(pid, signal)) => {
                    println!("[{}] stopped ({})", pid, signal);
                    break;
                }
                Ok(_) | Err(Errno::EINTR) => continue,
                Err(e) => {
                    warn!("waitpid {} failed: {}", pid, e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::error::BuiltinError;
    use crate::shell::executor::builtins::Builtin;
    use crate::shell::parser::parse;
    use serial_test::serial;
    use std::fs;
    use std::time::{Duration, Instant};

    fn executor() -> Executor {
        Executor::new(
            "shellgibi",
            crate::utils::path::DEFAULT_SEARCH_PATH
                .iter()
                .map(PathBuf::from)
                .collect(),
            BuiltinRegistry::with_defaults(),
        )
    }

    fn run(line: &str) -> Result<ExitSignal, ShellError> {
        executor().execute(&parse(line))
    }

    #[test]
    fn test_blank_line_is_a_no_op() {
        assert!(matches!(run(""), Ok(ExitSignal::Continue)));
        assert!(matches!(run("   "), Ok(ExitSignal::Continue)));
    }

    #[test]
    fn test_exit_keyword() {
        assert!(matches!(run("exit"), Ok(ExitSignal::Terminate)));
        assert!(matches!(run("  exit  "), Ok(ExitSignal::Terminate)));
    }

    #[test]
    #[serial]
    fn test_cd_changes_directory() {
        let original = env::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().canonicalize().unwrap();

        let result = run(&format!("cd {}", target.display()));
        let now = env::current_dir().unwrap();
        env::set_current_dir(&original).unwrap();

        assert!(matches!(result, Ok(ExitSignal::Continue)));
        assert_eq!(now, target);
    }

    #[test]
    #[serial]
    fn test_cd_failure_is_reported() {
        let result = run("cd /definitely/not/a/dir");
        assert!(matches!(
            result,
            Err(ShellError::ChangeDirectory { ref target, .. }) if target == "/definitely/not/a/dir"
        ));
    }

    #[test]
    fn test_rejects_empty_redirect_target() {
        assert!(matches!(run("echo hi >"), Err(ShellError::EmptyRedirect { .. })));
        assert!(matches!(run("sort <"), Err(ShellError::EmptyRedirect { .. })));
    }

    #[test]
    fn test_rejects_misplaced_redirects() {
        assert!(matches!(
            run("sort < in.txt | uniq"),
            Err(ShellError::MisplacedRedirect { kind: "input", .. })
        ));
        assert!(matches!(
            run("ls > out.txt | wc"),
            Err(ShellError::MisplacedRedirect { kind: "output", .. })
        ));
        assert!(matches!(
            run("echo a > x >> y"),
            Err(ShellError::ConflictingOutputRedirect { .. })
        ));
        assert!(matches!(run("ls |"), Err(ShellError::MissingPipeStage)));
    }

    #[test]
    #[serial]
    fn test_bare_redirect_before_another_redirect_is_rejected() {
        let original = env::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        env::set_current_dir(dir.path()).unwrap();

        let result = run("echo hi > >>log.txt");
        let created = fs::read_dir(dir.path()).unwrap().count();
        env::set_current_dir(&original).unwrap();

        assert!(matches!(result, Err(ShellError::EmptyRedirect { .. })));
        assert_eq!(created, 0);
    }

    #[test]
    fn test_missing_input_file() {
        assert!(matches!(
            run("sort < /definitely/not/here.txt"),
            Err(ShellError::Redirect { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_output_redirection() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        assert!(matches!(
            run(&format!("echo hello world > {}", out.display())),
            Ok(ExitSignal::Continue)
        ));
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello world\n");

        run(&format!("echo again >>{}", out.display())).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello world\nagain\n");

        run(&format!("echo fresh >{}", out.display())).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "fresh\n");
    }

    #[test]
    #[serial]
    fn test_pipeline_and_input_redirection() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("upper.txt");
        run(&format!("echo shout | tr a-z A-Z > {}", out.display())).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "SHOUT\n");

        let sorted = dir.path().join("sorted.txt");
        run(&format!("sort < {} > {}", out.display(), sorted.display())).unwrap();
        assert_eq!(fs::read_to_string(&sorted).unwrap(), "SHOUT\n");
    }

    struct Greet;

    impl Builtin for Greet {
        fn name(&self) -> &'static str {
            "greet"
        }

        fn run(&self, args: &[String]) -> Result<(), BuiltinError> {
            println!("hello {}", args.join(" "));
            Ok(())
        }
    }

    #[test]
    #[serial]
    fn test_builtin_runs_in_child_with_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("greeting.txt");
        let mut builtins = BuiltinRegistry::with_defaults();
        builtins.register(Box::new(Greet));
        let executor = Executor::new("shellgibi", Vec::new(), builtins);

        let result = executor.execute(&parse(&format!("greet ada > {}", out.display())));
        assert!(matches!(result, Ok(ExitSignal::Continue)));
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello ada\n");
    }

    #[test]
    #[serial]
    fn test_failing_builtin_continues() {
        // `pause` without a pid fails inside the child only.
        assert!(matches!(run("pause"), Ok(ExitSignal::Continue)));
    }

    #[test]
    #[serial]
    fn test_unknown_command_continues() {
        assert!(matches!(
            run("definitely-not-a-command-4711"),
            Ok(ExitSignal::Continue)
        ));
    }

    #[test]
    #[serial]
    fn test_background_does_not_block() {
        let start = Instant::now();
        assert!(matches!(run("sleep 3 &"), Ok(ExitSignal::Continue)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
