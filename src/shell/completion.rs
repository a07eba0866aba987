//! Prefix autocompletion for command names and file names.

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::shell::executor::BuiltinRegistry;
use crate::shell::parser::{Command, Pipeline};
use crate::utils::path::entries_with_prefix;

/// Upper bound on the number of candidates collected per request.
pub const MAX_SUGGESTIONS: usize = 1024;

const PER_ROW: usize = 5;

/// Ordered candidates of one autocomplete request, capped at [`MAX_SUGGESTIONS`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Suggestions {
    items: Vec<String>,
}

impl Suggestions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false once the cap is reached; the candidate is dropped.
    pub fn push(&mut self, candidate: String) -> bool {
        if self.items.len() >= MAX_SUGGESTIONS {
            return false;
        }
        self.items.push(candidate);
        true
    }

    fn extend(&mut self, candidates: impl IntoIterator<Item = String>) {
        for candidate in candidates {
            if !self.push(candidate) {
                break;
            }
        }
    }

    fn push_unique(&mut self, candidate: String) {
        if !self.items.contains(&candidate) {
            self.push(candidate);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }
}

/// A single candidate on its own line, otherwise five tab-separated per row.
impl fmt::Display for Suggestions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [only] = self.as_slice() {
            return writeln!(f, "{}", only);
        }
        for row in self.items.chunks(PER_ROW) {
            writeln!(f, "{}", row.join("\t"))?;
        }
        Ok(())
    }
}

pub struct Completer {
    search_path: Vec<PathBuf>,
}

impl Completer {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    /// Suggestions for the pipeline relative to the process's working directory.
    pub fn suggest(&self, pipeline: &Pipeline, builtins: &BuiltinRegistry) -> Suggestions {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        self.suggest_in(pipeline, builtins, &cwd)
    }

    pub fn suggest_in(&self, pipeline: &Pipeline, builtins: &BuiltinRegistry, cwd: &Path) -> Suggestions {
        // Only the last stage of a pipeline is being completed.
        let command = pipeline.tail();

        let mut suggestions = Suggestions::new();
        if command.args.is_empty() && !command.has_redirect() {
            debug!("completing command name {:?}", command.name);
            self.collect_commands(&command.name, builtins, &mut suggestions);
        } else if let Some(partial) = redirect_partial(command) {
            debug!("completing redirect target {:?}", partial);
            suggestions.extend(entries_with_prefix(cwd, partial));
        } else {
            let partial = command.args.last().map(String::as_str).unwrap_or_default();
            debug!("completing argument {:?}", partial);
            suggestions.extend(entries_with_prefix(cwd, partial));
        }
        suggestions
    }

    fn collect_commands(&self, prefix: &str, builtins: &BuiltinRegistry, out: &mut Suggestions) {
        for dir in &self.search_path {
            for name in entries_with_prefix(dir, prefix) {
                out.push_unique(name);
            }
        }
        for name in builtins.names() {
            if name.starts_with(prefix) {
                out.push_unique(name.to_string());
            }
        }
    }
}

fn redirect_partial(command: &Command) -> Option<&str> {
    command
        .redirect_in
        .as_deref()
        .or(command.redirect_out.as_deref())
        .or(command.redirect_append.as_deref())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::parser::parse;
    use std::fs::File;

    fn fixture(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            File::create(dir.path().join(name)).unwrap();
        }
        dir
    }

    fn sorted(suggestions: &Suggestions) -> Vec<&str> {
        let mut items: Vec<&str> = suggestions.as_slice().iter().map(String::as_str).collect();
        items.sort();
        items
    }

    #[test]
    fn test_argument_completion() {
        let cwd = fixture(&["report.txt", "report2.txt", "readme.md"]);
        let completer = Completer::new(Vec::new());
        let pipeline = parse("cat rep?");
        let suggestions = completer.suggest_in(&pipeline, &BuiltinRegistry::new(), cwd.path());
        assert_eq!(sorted(&suggestions), vec!["report.txt", "report2.txt"]);
    }

    #[test]
    fn test_empty_argument_lists_directory() {
        let cwd = fixture(&["a", "b"]);
        let completer = Completer::new(Vec::new());
        let pipeline = parse("cat ?");
        let suggestions = completer.suggest_in(&pipeline, &BuiltinRegistry::new(), cwd.path());
        assert_eq!(sorted(&suggestions), vec!["a", "b"]);
    }

    #[test]
    fn test_redirect_completion() {
        let cwd = fixture(&["out.log", "other.txt", "input"]);
        let completer = Completer::new(Vec::new());
        let pipeline = parse("sort -r >ou?");
        let suggestions = completer.suggest_in(&pipeline, &BuiltinRegistry::new(), cwd.path());
        assert_eq!(sorted(&suggestions), vec!["out.log"]);
    }

    #[test]
    fn test_command_name_completion() {
        let bin = fixture(&["grep", "groups", "ls"]);
        let local = fixture(&["grep", "gres"]);
        let completer = Completer::new(vec![bin.path().to_path_buf(), local.path().to_path_buf()]);
        let cwd = fixture(&["gremlin"]);
        let suggestions =
            completer.suggest_in(&parse("gr?"), &BuiltinRegistry::with_defaults(), cwd.path());
        assert_eq!(sorted(&suggestions), vec!["grep", "gres", "groups"]);

        let suggestions =
            completer.suggest_in(&parse("vol?"), &BuiltinRegistry::with_defaults(), cwd.path());
        assert_eq!(suggestions.as_slice(), ["volume"]);
    }

    #[test]
    fn test_builtins_come_last() {
        let bin = fixture(&["pager"]);
        let completer = Completer::new(vec![bin.path().to_path_buf()]);
        let suggestions = completer.suggest_in(
            &parse("pa?"),
            &BuiltinRegistry::with_defaults(),
            Path::new("/"),
        );
        assert_eq!(suggestions.as_slice(), ["pager", "pause"]);
    }

    #[test]
    fn test_pipeline_completes_last_stage() {
        let bin = fixture(&["wc", "cat"]);
        let cwd = fixture(&["words.txt"]);
        let completer = Completer::new(vec![bin.path().to_path_buf()]);
        let suggestions = completer.suggest_in(
            &parse("cat words.txt | w?"),
            &BuiltinRegistry::new(),
            cwd.path(),
        );
        assert_eq!(suggestions.as_slice(), ["wc"]);
    }

    #[test]
    fn test_cap() {
        let mut suggestions = Suggestions::new();
        for i in 0..MAX_SUGGESTIONS {
            assert!(suggestions.push(i.to_string()));
        }
        assert!(!suggestions.push("overflow".to_string()));
        assert_eq!(suggestions.len(), MAX_SUGGESTIONS);
    }

    #[test]
    fn test_display() {
        let mut one = Suggestions::new();
        one.push("report.txt".to_string());
        assert_eq!(one.to_string(), "report.txt\n");

        let mut many = Suggestions::new();
        for name in ["a", "b", "c", "d", "e", "f", "g"] {
            many.push(name.to_string());
        }
        assert_eq!(many.to_string(), "a\tb\tc\td\te\nf\tg\n");
        assert_eq!(Suggestions::new().to_string(), "");
    }
}
