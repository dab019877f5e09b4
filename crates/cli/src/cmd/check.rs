//! Validate an event script without replaying it

use cli_lib::script::{self, Step};
use anyhow::Result;
use owo_colors::OwoColorize;
use std::collections::HashSet;

pub async fn run(input: &str) -> Result<()> {
    let steps = script::load(input)?;

    let mut events = 0;
    let mut flushes = 0;
    let mut paths = HashSet::new();
    for step in &steps {
        match step {
            Step::Event(evt) => {
                events += 1;
                paths.insert(evt.path.clone());
            }
            Step::Flush => flushes += 1,
        }
    }

    println!("{} {}", "Script OK:".green().bold(), input);
    println!("  events: {}", events);
    println!("  paths: {}", paths.len());
    println!("  flushes: {}", flushes);
    Ok(())
}
