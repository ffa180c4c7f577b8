use anyhow::Result;
use async_trait::async_trait;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// Asks the user for a value.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// `None` when the user gave no answer (interrupt or end of input).
    async fn prompt(&self, message: &str) -> Result<Option<String>>;
}

/// Reads answers from the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinePrompter;

#[async_trait]
impl Prompter for LinePrompter {
    async fn prompt(&self, message: &str) -> Result<Option<String>> {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || read_answer(&message)).await?
    }
}

fn read_answer(message: &str) -> Result<Option<String>> {
    let mut rl = DefaultEditor::new()?;
    match rl.readline(message) {
        Ok(line) => Ok(Some(line.trim().to_string())),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Never answers; used when no terminal is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompter;

#[async_trait]
impl Prompter for NoPrompter {
    async fn prompt(&self, _message: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
