use std::io::{self, Write};
use std::time::Instant;

/// Stage lines on stderr, prefixed with the elapsed run time.
pub struct ConsoleProgress {
    enabled: bool,
    started: Instant,
}

impl ConsoleProgress {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn silent() -> Self {
        Self::new(false)
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if !self.enabled {
            return;
        }
        let ts = fmt_elapsed(self.started.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {}", msg.as_ref());
    }

    /// `[mm:ss] stage 03/11 reduce: 1204 words (+2 edits)`
    pub fn stage(&self, index: usize, total: usize, name: &str, words: usize, edits: usize) {
        if !self.enabled {
            return;
        }
        self.info(stage_line(index, total, name, words, edits));
    }
}

fn stage_line(index: usize, total: usize, name: &str, words: usize, edits: usize) -> String {
    let total = total.max(1);
    let index = index.min(total);
    if edits == 0 {
        format!("stage {index:02}/{total:02} {name}: {words} words")
    } else {
        format!("stage {index:02}/{total:02} {name}: {words} words (+{edits} edits)")
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::{fmt_elapsed, stage_line};

    #[test]
    fn elapsed_switches_to_hours() {
        assert_eq!(fmt_elapsed(0.4), "00:00");
        assert_eq!(fmt_elapsed(75.0), "01:15");
        assert_eq!(fmt_elapsed(3725.0), "01:02:05");
    }

    #[test]
    fn stage_lines_mention_edits_only_when_present() {
        assert_eq!(stage_line(3, 11, "reduce", 1204, 2), "stage 03/11 reduce: 1204 words (+2 edits)");
        assert_eq!(stage_line(1, 11, "layout", 900, 0), "stage 01/11 layout: 900 words");
    }
}
