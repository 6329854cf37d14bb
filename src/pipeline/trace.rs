use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

/// Per-run snapshot directory. A disabled writer accepts every call and writes nothing.
pub struct TraceWriter {
    dir: PathBuf,
    enabled: bool,
}

impl TraceWriter {
    pub fn new(dir: PathBuf, enabled: bool) -> anyhow::Result<Self> {
        if enabled {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create trace dir: {}", dir.display()))?;
        }
        Ok(Self { dir, enabled })
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_named_text(&self, name: &str, text: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.dir.join(sanitize_filename(name));
        std::fs::write(&path, text).with_context(|| format!("write trace: {}", path.display()))?;
        Ok(())
    }

    /// `NN.stage.txt`
    pub fn write_stage(&self, index: usize, stage: &str, text: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.write_named_text(&format!("{index:02}.{stage}.txt"), text)
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let body = serde_json::to_string_pretty(value).context("serialize trace json")?;
        self.write_named_text(name, &body)
    }
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            c if c.is_whitespace() => out.push('_'),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{sanitize_filename, TraceWriter};

    #[test]
    fn stage_snapshots_are_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let trace = TraceWriter::new(dir.path().join("trace"), true).unwrap();
        trace.write_stage(3, "reduce", "testo").unwrap();
        trace
            .write_json("report.json", &serde_json::json!({ "wordCount": 2 }))
            .unwrap();
        let body = std::fs::read_to_string(dir.path().join("trace").join("03.reduce.txt")).unwrap();
        assert_eq!(body, "testo");
        assert!(dir.path().join("trace").join("report.json").exists());
    }

    #[test]
    fn disabled_writer_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let trace = TraceWriter::new(dir.path().join("off"), false).unwrap();
        trace.write_stage(1, "layout", "x").unwrap();
        assert!(!dir.path().join("off").exists());
    }

    #[test]
    fn filenames_lose_path_separators() {
        assert_eq!(sanitize_filename("a/b:c d.txt"), "a_b_c_d.txt");
    }
}
