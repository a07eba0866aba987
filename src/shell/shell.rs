use log::{debug, error, warn};
use nix::unistd::gethostname;
use std::env;
use std::error::Error;
use std::io::{self, Write};

use crate::shell::completion::Completer;
use crate::shell::error::ShellError;
use crate::shell::executor::{BuiltinRegistry, Executor, ExitSignal};
use crate::shell::parser::{parse, Pipeline};
use crate::shell::readline::LineEditor;
use crate::utils::config::Config;
use crate::utils::path::current_dir;
use crate::utils::theme::Theme;

pub struct Shell<'a> {
    config: &'a Config,
    theme: Theme,
    editor: LineEditor,
    completer: Completer,
    executor: Executor,
}

impl<'a> Shell<'a> {
    pub fn new(config: &'a Config, theme: Theme) -> Self {
        Self {
            config,
            theme,
            editor: LineEditor::new(),
            completer: Completer::new(config.search_path.clone()),
            executor: Executor::new(
                &config.name,
                config.search_path.clone(),
                BuiltinRegistry::with_defaults(),
            ),
        }
    }

    pub fn run(&mut self) -> Result<(), Box<dyn Error>> {
        debug!("starting {}", self.config.name);
        let result = self.run_loop();
        if let Err(e) = &result {
            error!("leaving on fatal error: {}", e);
        }
        println!("\n{}", self.theme.exit_message);
        debug!("leaving {}", self.config.name);
        result
    }

    fn run_loop(&mut self) -> Result<(), Box<dyn Error>> {
        loop {
            self.executor.reap_background();
            print!("{}", self.prompt());
            io::stdout().flush()?;

            let line = match self.editor.read_line() {
                Ok(line) => line,
                Err(e) => {
                    eprintln!("\n{}", (self.theme.error_style)(format!("-{}: {}", self.config.name, e)));
                    return Err(e.into());
                }
            };
            if line.eof {
                debug!("EOF on input");
                return Ok(());
            }

            let pipeline = parse(&line.text);
            debug!("parsed {:?} as {}", line.text, pipeline);
            if pipeline.autocomplete() {
                self.complete(&pipeline);
                continue;
            }

            match self.executor.execute(&pipeline) {
                Ok(ExitSignal::Continue) => {}
                Ok(ExitSignal::Terminate) => return Ok(()),
                Err(e) => self.report(e)?,
            }
        }
    }

    fn complete(&self, pipeline: &Pipeline) {
        let suggestions = self.completer.suggest(pipeline, self.executor.builtins());
        if suggestions.is_empty() {
            debug!("no completion for {}", pipeline);
        } else {
            debug!("{} suggestions for {}", suggestions.len(), pipeline);
        }
        print!("\n{}", suggestions);
    }

    /// Prints a per-command error; only fatal ones propagate.
    fn report(&self, e: ShellError) -> Result<(), ShellError> {
        if e.is_fatal() {
            return Err(e);
        }
        warn!("command failed: {}", e);
        eprintln!("{}", (self.theme.error_style)(format!("-{}: {}", self.config.name, e)));
        Ok(())
    }

    fn prompt(&self) -> String {
        let user = env::var("USER")
            .or_else(|_| env::var("LOGNAME"))
            .unwrap_or_else(|_| String::from("?"));
        let host = gethostname()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("?"));
        self.theme.prompt(&user, &host, &current_dir(), &self.config.name)
    }
}
