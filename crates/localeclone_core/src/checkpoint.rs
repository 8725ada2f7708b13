use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

/// Operator gate between create batches: the created copies only become valid
/// link targets once the release holding them has been published.
pub trait ReleaseCheckpoint {
    /// Returns `true` to continue with the next batch, `false` to stop the run.
    fn confirm_release_published(&mut self, batch: usize, total_batches: usize) -> Result<bool>;
}

pub struct TerminalCheckpoint<R, W> {
    input: R,
    output: W,
}

impl TerminalCheckpoint<io::StdinLock<'static>, io::Stdout> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalCheckpoint<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> ReleaseCheckpoint for TerminalCheckpoint<R, W> {
    fn confirm_release_published(&mut self, batch: usize, total_batches: usize) -> Result<bool> {
        writeln!(
            self.output,
            "batch {batch}/{total_batches} uploaded. PUBLISH your migration release, then type \"c\" to continue (anything else stops):"
        )
        .context("failed to write release prompt")?;
        self.output
            .flush()
            .context("failed to flush release prompt")?;

        let mut answer = String::new();
        let read = self
            .input
            .read_line(&mut answer)
            .context("failed to read release confirmation")?;
        if read == 0 {
            return Ok(false);
        }
        Ok(answer.trim().eq_ignore_ascii_case("c"))
    }
}
