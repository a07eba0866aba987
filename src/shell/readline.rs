use std::io::{self, Read, Write};

use log::{debug, error};
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg, SpecialCharacterIndices, Termios};

use crate::shell::error::ShellError;

/// Longest line the editor accepts; reaching it submits the line.
pub const MAX_LINE: usize = 4096;

const TAB: u8 = b'\t';
const EOT: u8 = 4;
const ESC: u8 = 27;
const DEL: u8 = 127;

/// Result of one `read_line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadLine {
    pub text: String,
    pub eof: bool,
}

/// Puts stdin into non-canonical, non-echoing mode and restores the saved
/// attributes when dropped.
struct RawMode {
    original: Termios,
}

impl RawMode {
    fn enable() -> Result<Self, ShellError> {
        let original = tcgetattr(io::stdin()).map_err(ShellError::Terminal)?;
        let mut raw = original.clone();
        raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
        tcsetattr(io::stdin(), SetArg::TCSANOW, &raw).map_err(ShellError::Terminal)?;
        Ok(Self { original })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = tcsetattr(io::stdin(), SetArg::TCSANOW, &self.original) {
            error!("failed to restore terminal mode: {}", e);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    Esc,
    Bracket,
}

/// Keystroke-level line editor with single-line recall.
#[derive(Default)]
pub struct LineEditor {
    previous: String,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads one line from the terminal. The terminal is back in its
    /// original mode when this returns, whatever the outcome.
    pub fn read_line(&mut self) -> Result<ReadLine, ShellError> {
        let _raw = RawMode::enable()?;
        let stdin = io::stdin();
        let stdout = io::stdout();
        let line = self.read_from(stdin.lock(), stdout.lock())?;
        Ok(line)
    }

    /// Editing loop over any byte source, echoing to `output`.
    pub fn read_from<R: Read, W: Write>(&mut self, input: R, mut output: W) -> io::Result<ReadLine> {
        let mut buf: Vec<u8> = Vec::new();
        let mut escape = Escape::None;
        let mut submitted = false;

        for byte in input.bytes() {
            let byte = byte?;
            match (escape, byte) {
                (Escape::None, ESC) => {
                    escape = Escape::Esc;
                    continue;
                }
                (Escape::Esc, b'[') => {
                    escape = Escape::Bracket;
                    continue;
                }
                (Escape::Bracket, b'A') => {
                    escape = Escape::None;
                    self.recall(&mut buf, &mut output)?;
                    continue;
                }
                _ => escape = Escape::None,
            }

            match byte {
                EOT => {
                    output.flush()?;
                    return Ok(ReadLine {
                        text: String::from_utf8_lossy(&buf).into_owned(),
                        eof: true,
                    });
                }
                b'\n' | b'\r' => {
                    output.write_all(b"\n")?;
                    submitted = true;
                    break;
                }
                TAB => {
                    buf.push(b'?');
                    submitted = true;
                    break;
                }
                DEL => {
                    if !buf.is_empty() {
                        pop_char(&mut buf);
                        erase(&mut output)?;
                    }
                }
                byte if byte < 0x20 => {}
                byte => {
                    buf.push(byte);
                    output.write_all(&[byte])?;
                    if buf.len() >= MAX_LINE {
                        submitted = true;
                        break;
                    }
                }
            }
            output.flush()?;
        }
        output.flush()?;

        let text = String::from_utf8_lossy(&buf).into_owned();
        if !submitted {
            // The input stream itself ended.
            return Ok(ReadLine { text, eof: true });
        }
        self.previous.clone_from(&text);
        debug!("read line {:?}", text);
        Ok(ReadLine { text, eof: false })
    }

    /// Replaces the displayed buffer with the previously submitted line.
    fn recall<W: Write>(&self, buf: &mut Vec<u8>, output: &mut W) -> io::Result<()> {
        while !buf.is_empty() {
            pop_char(buf);
            erase(output)?;
        }
        buf.extend_from_slice(self.previous.as_bytes());
        output.write_all(self.previous.as_bytes())?;
        output.flush()
    }
}

/// Removes the last UTF-8 character, continuation bytes included.
fn pop_char(buf: &mut Vec<u8>) {
    while let Some(byte) = buf.pop() {
        if byte & 0xC0 != 0x80 {
            break;
        }
    }
}

fn erase<W: Write>(output: &mut W) -> io::Result<()> {
    output.write_all(b"\x08 \x08")
}
