//! Operator prompts over any line reader and writer.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::dates::DateWindow;
use crate::error::{ReportError, Result};
use crate::report::ReportFormat;

pub const YES: &str = "Yes";
pub const NO: &str = "No";

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `question` and read one trimmed line. End of input is an error
    /// so that loops below cannot spin forever.
    pub fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{} ", question)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(ReportError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "input closed while waiting for an answer",
            )));
        }
        Ok(line.trim().to_string())
    }

    fn say(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{}", message)?;
        Ok(())
    }

    pub fn ask_site_url(&mut self) -> Result<String> {
        loop {
            let url = self.ask("Site URL as registered in Search Console:")?;
            if !url.is_empty() {
                return Ok(url);
            }
        }
    }

    /// Re-asks until the answer parses as `YYYY-MM`.
    pub fn ask_month(&mut self) -> Result<DateWindow> {
        loop {
            let answer = self.ask("Enter the month to compare (YYYY-MM):")?;
            match DateWindow::from_month_input(&answer) {
                Ok(window) => return Ok(window),
                Err(ReportError::InvalidMonth(_)) => {
                    self.say("Please use the YYYY-MM format, e.g. 2024-02.")?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Exact `Yes` / `No`; anything else asks again.
    pub fn confirm_report(&mut self) -> Result<bool> {
        loop {
            let answer = self.ask(&format!("Generate a report? ({YES}/{NO})"))?;
            match answer.as_str() {
                YES => return Ok(true),
                NO => return Ok(false),
                _ => self.say(&format!("Please answer {YES} or {NO}."))?,
            }
        }
    }

    pub fn ask_format(&mut self) -> Result<ReportFormat> {
        loop {
            let answer = self.ask("Report format? (CSV/PDF)")?;
            match answer.parse::<ReportFormat>() {
                Ok(format) => return Ok(format),
                Err(e) => self.say(&e.to_string())?,
            }
        }
    }

    /// A file name under `dir` that does not exist yet.
    pub fn ask_new_filename(&mut self, dir: &Path) -> Result<PathBuf> {
        loop {
            let name = self.ask("File name:")?;
            if name.is_empty() {
                continue;
            }
            let path = dir.join(&name);
            if path.exists() {
                self.say(&format!("{} already exists, choose another name.", path.display()))?;
                continue;
            }
            return Ok(path);
        }
    }
}
