/// A whitespace-delimited word of the command line.
#[derive(Debug, PartialEq, Clone)]
pub struct Token<'a> {
    /// Text with a matching pair of surrounding quotes removed.
    pub text: &'a str,
    /// True when the word was wrapped in quotes; quoted words are never operators.
    pub quoted: bool,
    /// Byte offset just past the word in the lexer's input.
    pub end: usize,
}

impl Token<'_> {
    pub fn is_operator(&self, op: &str) -> bool {
        !self.quoted && self.text == op
    }
}

#[derive(Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

pub fn is_separator(c: char) -> bool {
    c == ' ' || c == '\t'
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.pos..];
        let trimmed = rest.trim_start_matches(is_separator);
        self.pos += rest.len() - trimmed.len();
    }

    fn read_word(&mut self) -> Token<'a> {
        let start = self.pos;
        let rest = &self.input[start..];
        let len = rest.find(is_separator).unwrap_or(rest.len());
        self.pos = start + len;
        let text = &rest[..len];
        match strip_quotes(text) {
            Some(inner) => Token {
                text: inner,
                quoted: true,
                end: self.pos,
            },
            None => Token {
                text,
                quoted: false,
                end: self.pos,
            },
        }
    }

    /// A word opening with a quote runs to the matching quote, whitespace
    /// included. Without a matching quote it degrades to a plain word.
    fn read_quoted(&mut self, quote: char) -> Token<'a> {
        let start = self.pos;
        let rest = &self.input[start..];
        let close = match rest[1..].find(quote) {
            Some(offset) => offset + 1,
            None => return self.read_word(),
        };
        let after = &rest[close + 1..];
        if !after.is_empty() && !after.starts_with(is_separator) {
            // Closing quote is not at a word boundary, e.g. "a"b.
            return self.read_word();
        }
        self.pos = start + close + 1;
        Token {
            text: &rest[1..close],
            quoted: true,
            end: self.pos,
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        match self.input[self.pos..].chars().next()? {
            quote @ ('"' | '\'') => Some(self.read_quoted(quote)),
            _ => Some(self.read_word()),
        }
    }
}

fn strip_quotes(word: &str) -> Option<&str> {
    for quote in ['"', '\''] {
        if word.len() >= 2 && word.starts_with(quote) && word.ends_with(quote) {
            return Some(&word[1..word.len() - 1]);
        }
    }
    None
}
