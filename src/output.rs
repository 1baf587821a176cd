use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Optional append-only report files shared by every run of a session.
#[derive(Debug, Default)]
pub struct Sinks {
    raw: Option<File>,
    summary: Option<File>,
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Sinks {
    pub fn open(raw: Option<&Path>, summary: Option<&Path>) -> io::Result<Self> {
        Ok(Self {
            raw: raw.map(open_append).transpose()?,
            summary: summary.map(open_append).transpose()?,
        })
    }

    pub fn raw_text(&mut self, text: &str) -> io::Result<()> {
        if let Some(f) = self.raw.as_mut() {
            f.write_all(text.as_bytes())?;
        }
        Ok(())
    }

    pub fn raw_line(&mut self, line: &str) -> io::Result<()> {
        if let Some(f) = self.raw.as_mut() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }

    pub fn summary_text(&mut self, text: &str) -> io::Result<()> {
        if let Some(f) = self.summary.as_mut() {
            f.write_all(text.as_bytes())?;
        }
        Ok(())
    }
}
