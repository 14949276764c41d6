use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};

/// Console interaction used by the interactive bots.
pub trait Prompt {
    /// Show `question` and return the raw answer without its trailing newline.
    fn ask(&mut self, question: &str) -> Result<String>;

    fn say(&mut self, line: &str);

    /// Ask until the answer is one of `options` (case-insensitive); empty input yields `default`.
    fn choose(&mut self, question: &str, options: &[&str], default: &str) -> Result<String> {
        let rendered = format!("{question} [{}]", options.join("/"));
        loop {
            let answer = self.ask(&rendered)?.trim().to_ascii_lowercase();
            if answer.is_empty() {
                return Ok(default.to_string());
            }
            if options.iter().any(|option| option.eq_ignore_ascii_case(&answer)) {
                return Ok(answer);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{question} ").context("failed to write prompt")?;
        stdout.flush().context("failed to flush prompt")?;

        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .context("failed to read console input")?;
        if read == 0 {
            bail!("console input closed");
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn say(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Replays canned answers and records everything shown to the user.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ScriptedPrompt {
    answers: std::collections::VecDeque<String>,
    pub questions: Vec<String>,
    pub output: Vec<String>,
}

#[cfg(test)]
impl ScriptedPrompt {
    pub(crate) fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|answer| answer.to_string()).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.answers.len()
    }

    pub(crate) fn transcript(&self) -> String {
        self.output.join("\n")
    }
}

#[cfg(test)]
impl Prompt for ScriptedPrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        self.questions.push(question.to_string());
        match self.answers.pop_front() {
            Some(answer) => Ok(answer),
            None => bail!("no scripted answer left for: {question}"),
        }
    }

    fn say(&mut self, line: &str) {
        self.output.push(line.to_string());
    }
}
