//! Line input shared by password prompts and the interactive shell.
//!
//! On a terminal, passwords are read with echo disabled via `dialoguer`.
//! Otherwise every read, password or command, takes the next line of
//! stdin, so a script can pipe `secret\ncluster status\n` into `labsh shell`.

use std::io::{BufRead, IsTerminal};

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::warn;

pub struct Input {
    lines: Option<mpsc::Receiver<String>>,
    interactive: bool,
}

impl Input {
    /// Read from this process's stdin.
    pub fn stdin() -> Self {
        Self {
            lines: None,
            interactive: std::io::stdin().is_terminal(),
        }
    }

    /// A fixed, non-interactive script of lines.
    #[cfg(test)]
    pub fn scripted<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            // Capacity covers every line.
            let _ = tx.try_send(line);
        }
        Self {
            lines: Some(rx),
            interactive: false,
        }
    }

    #[cfg(test)]
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Next line without its terminator, or `None` at end of input.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines
            .get_or_insert_with(spawn_stdin_reader)
            .recv()
            .await
    }

    /// Ask for a password.
    pub async fn password(&mut self, prompt: &str) -> Result<String> {
        if self.interactive {
            let prompt = prompt.to_string();
            return tokio::task::spawn_blocking(move || {
                dialoguer::Password::new()
                    .with_prompt(prompt)
                    .allow_empty_password(true)
                    .interact()
            })
            .await
            .context("password prompt task failed")?
            .context("failed to read password from terminal");
        }

        match self.next_line().await {
            Some(line) => Ok(line.trim().to_string()),
            None => bail!("failed to read password from stdin: end of input"),
        }
    }
}

/// Read stdin on a plain thread; it may block forever and must not hold up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("stdin read error: {e}");
                    break;
                }
            }
        }
    });
    rx
}
