//! Console collaborators for the `connect` command.

use std::io::{self, BufRead, IsTerminal, Write};

use relink_common::transport::bound_message;

/// Outbound messages read line by line from a console.
///
/// Each line loses its line ending and is cut at the first NUL byte and at
/// `max_len` bytes. End of input (or a read error) ends the session.
pub struct ConsoleSource<R> {
    reader: R,
    max_len: usize,
    prompt: bool,
}

impl ConsoleSource<io::BufReader<io::Stdin>> {
    /// Reads standard input, prompting only when it is a terminal.
    pub fn stdin(max_len: usize) -> Self {
        let stdin = io::stdin();
        let prompt = stdin.is_terminal();
        Self::new(io::BufReader::new(stdin), max_len).with_prompt(prompt)
    }
}

impl<R: BufRead> ConsoleSource<R> {
    pub fn new(reader: R, max_len: usize) -> Self {
        Self {
            reader,
            max_len,
            prompt: false,
        }
    }

    pub fn with_prompt(mut self, prompt: bool) -> Self {
        self.prompt = prompt;
        self
    }
}

impl<R: BufRead> Iterator for ConsoleSource<R> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if self.prompt {
            let mut out = io::stdout().lock();
            let _ = write!(out, "Send message to server: ");
            let _ = out.flush();
        }

        let mut line = Vec::new();
        match self.reader.read_until(b'\n', &mut line) {
            Ok(0) => None,
            Ok(_) => {
                while matches!(line.last(), Some(b'\n' | b'\r')) {
                    line.pop();
                }
                Some(bound_message(&line, self.max_len).to_vec())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read console input");
                None
            }
        }
    }
}

/// Writes one echoed message the way the console shows it.
pub fn write_echo<W: Write>(out: &mut W, message: &[u8]) -> io::Result<()> {
    writeln!(out, "Echo message from server: {}", String::from_utf8_lossy(message))
}

/// Sink that prints echoed messages to stdout.
pub fn print_echo(message: &[u8]) {
    let mut out = io::stdout().lock();
    if let Err(e) = write_echo(&mut out, message).and_then(|_| out.flush()) {
        tracing::warn!(error = %e, "Failed to print message");
    }
}
