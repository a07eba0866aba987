use std::fmt;

/// One stage of a pipeline. `args` does not include `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    pub redirect_in: Option<String>,
    pub redirect_out: Option<String>,
    pub redirect_append: Option<String>,
    pub background: bool,
    pub autocomplete: bool,
    pub next: Option<Box<Command>>,
}

impl Command {
    pub fn has_redirect(&self) -> bool {
        self.redirect_in.is_some() || self.redirect_out.is_some() || self.redirect_append.is_some()
    }

    /// Output target, if any. `>>` wins over `>` only when `>` is absent;
    /// the executor rejects the combination before this is consulted.
    pub fn output_target(&self) -> Option<(&str, bool)> {
        match (&self.redirect_out, &self.redirect_append) {
            (Some(path), _) => Some((path.as_str(), false)),
            (None, Some(path)) => Some((path.as_str(), true)),
            (None, None) => None,
        }
    }

    /// Argument vector handed to the OS: the name followed by the arguments.
    pub fn argv(&self) -> Vec<&str> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.name.as_str());
        argv.extend(self.args.iter().map(String::as_str));
        argv
    }

    fn fmt_stage(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.name))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        let redirects = [
            ("<", &self.redirect_in),
            (">", &self.redirect_out),
            (">>", &self.redirect_append),
        ];
        for (op, target) in redirects {
            if let Some(path) = target {
                fmt_redirect(f, op, path)?;
            }
        }
        Ok(())
    }
}

/// A non-empty chain of commands. Flags on the head apply to the whole chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub head: Command,
}

impl Pipeline {
    pub fn new(head: Command) -> Self {
        Self { head }
    }

    pub fn background(&self) -> bool {
        self.head.background
    }

    pub fn autocomplete(&self) -> bool {
        self.head.autocomplete
    }

    pub fn is_blank(&self) -> bool {
        self.head.name.is_empty() && self.head.next.is_none()
    }

    pub fn stages(&self) -> Stages<'_> {
        Stages {
            current: Some(&self.head),
        }
    }

    pub fn len(&self) -> usize {
        self.stages().count()
    }

    pub fn tail(&self) -> &Command {
        let mut stage = &self.head;
        while let Some(next) = &stage.next {
            stage = next.as_ref();
        }
        stage
    }
}

pub struct Stages<'a> {
    current: Option<&'a Command>,
}

impl<'a> Iterator for Stages<'a> {
    type Item = &'a Command;

    fn next(&mut self) -> Option<Self::Item> {
        let stage = self.current?;
        self.current = stage.next.as_deref();
        Some(stage)
    }
}

/// Canonical command line: stages joined by ` | `, flag suffix once at the end.
impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, stage) in self.stages().enumerate() {
            if index > 0 {
                write!(f, " | ")?;
            }
            stage.fmt_stage(f)?;
        }
        if self.head.autocomplete {
            write!(f, "?")?;
        } else if self.head.background {
            write!(f, " &")?;
        }
        Ok(())
    }
}

/// Plain targets are attached (`>out`); targets needing quotes are detached
/// (`> "a b"`) since a quote only opens a word at its start.
fn fmt_redirect(f: &mut fmt::Formatter<'_>, op: &str, path: &str) -> fmt::Result {
    let quoted = quote(path);
    if quoted == path {
        write!(f, " {}{}", op, path)
    } else {
        write!(f, " {} {}", op, quoted)
    }
}

fn quote(word: &str) -> String {
    let needs_quotes = word.is_empty()
        || word.chars().any(char::is_whitespace)
        || word == "|"
        || word.starts_with(['<', '>', '"', '\''])
        || word.ends_with(['&', '?']);
    if !needs_quotes {
        return word.to_string();
    }
    if word.contains('"') {
        format!("'{}'", word)
    } else {
        format!("\"{}\"", word)
    }
}
