use std::io;

use thiserror::Error;

/// Errors raised while turning a parsed pipeline into processes.
///
/// Everything except [`ShellError::Terminal`] is local to one command line:
/// the read-eval loop prints it and prompts again.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{command}: missing redirection target")]
    EmptyRedirect { command: String },

    #[error("{command}: cannot redirect output with both '>' and '>>'")]
    ConflictingOutputRedirect { command: String },

    #[error("{command}: {kind} redirection is not allowed at this position in a pipeline")]
    MisplacedRedirect { command: String, kind: &'static str },

    #[error("missing command in pipeline")]
    MissingPipeStage,

    #[error("{path}: {source}")]
    Redirect {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{0}: argument contains a NUL byte")]
    NulByte(String),

    #[error("cd: {target}: {source}")]
    ChangeDirectory {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("terminal: {0}")]
    Terminal(#[source] nix::Error),

    #[error("cannot spawn process: {0}")]
    Spawn(#[source] nix::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ShellError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::Terminal(_))
    }
}

/// Argument and launch failures of builtin delegates.
#[derive(Debug, Error)]
pub enum BuiltinError {
    #[error("{builtin}: missing argument, usage: {usage}")]
    MissingArgument {
        builtin: &'static str,
        usage: &'static str,
    },

    #[error("{builtin}: invalid argument '{value}': {reason}")]
    InvalidArgument {
        builtin: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{0}: not a builtin")]
    Unknown(String),

    #[error("{program}: {source}")]
    Launch {
        program: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{program}: exited with status {status}")]
    Failed { program: &'static str, status: i32 },

    #[error("kill: {0}")]
    Signal(#[source] nix::Error),
}
