//! Event script parsing
//!
//! A script is one step per line:
//! ```text
//! # comment
//! create music/a.mp3
//! modify music/a.mp3
//! rename music/a.mp3 music/b.mp3
//! delete music/b.mp3
//! flush
//! ```

use anyhow::{Context, Result};
use std::io::Read;
use watcher::{EventKind, WatchEvent};

/// One line of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Submit an event
    Event(WatchEvent),
    /// Pack everything queued so far
    Flush,
}

/// Read a script from a file, or from stdin when `input` is `-`
pub fn load(input: &str) -> Result<Vec<Step>> {
    let contents = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read script from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read script {}", input))?
    };

    parse(&contents).with_context(|| format!("Invalid script {}", input))
}

/// Parse script text
pub fn parse(contents: &str) -> Result<Vec<Step>> {
    let mut steps = Vec::new();

    for (idx, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let step = parse_line(line).with_context(|| format!("line {}: '{}'", idx + 1, line))?;
        steps.push(step);
    }

    Ok(steps)
}

fn parse_line(line: &str) -> Result<Step> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        anyhow::bail!("empty step");
    };
    let args: Vec<&str> = parts.collect();

    if command == "flush" {
        if !args.is_empty() {
            anyhow::bail!("flush takes no arguments");
        }
        return Ok(Step::Flush);
    }

    let kind: EventKind = command.parse().map_err(anyhow::Error::msg)?;
    let evt = match (kind, args.as_slice()) {
        (EventKind::Rename, [from, to]) => WatchEvent::rename(*from, *to),
        (EventKind::Rename, _) => anyhow::bail!("rename takes <from> <to>"),
        (kind, [path]) => WatchEvent::new(kind, *path),
        (kind, _) => anyhow::bail!("{} takes exactly one path", kind),
    };

    Ok(Step::Event(evt))
}
