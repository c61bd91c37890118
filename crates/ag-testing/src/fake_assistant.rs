use std::path::{Path, PathBuf};

/// Builds a tiny POSIX shell script that stands in for the real assistant
/// CLI: it prints a scripted sequence of stream-json lines to stdout, an
/// optional message to stderr, then exits with a chosen code. Tests point
/// `ProcessController`/`InteractiveController` at it via `AG_ASSISTANT_BIN`
/// so the real subprocess-spawn and line-reading code paths are exercised
/// without depending on the real assistant being installed.
#[derive(Debug, Default, Clone)]
pub struct FakeAssistant {
    lines: Vec<String>,
    exit_code: i32,
    stderr: Option<String>,
    sleep_before_exit_ms: u64,
}

impl FakeAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn with_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn with_stderr(mut self, text: impl Into<String>) -> Self {
        self.stderr = Some(text.into());
        self
    }

    /// Useful for exercising pause/terminate against a process that is
    /// still alive when the assertion runs.
    pub fn with_sleep_before_exit_ms(mut self, ms: u64) -> Self {
        self.sleep_before_exit_ms = ms;
        self
    }

    /// Writes the script into `dir` and returns its path, marked executable.
    pub fn write_script(&self, dir: &Path) -> PathBuf {
        let path = dir.join("fake-assistant.sh");
        let mut script = String::from("#!/bin/sh\n");
        for line in &self.lines {
            script.push_str("cat <<'AGENTLING_FAKE_EOF'\n");
            script.push_str(line);
            script.push_str("\nAGENTLING_FAKE_EOF\n");
        }
        if let Some(stderr) = &self.stderr {
            script.push_str(&format!("echo {} 1>&2\n", shell_quote(stderr)));
        }
        if self.sleep_before_exit_ms > 0 {
            let secs = self.sleep_before_exit_ms as f64 / 1000.0;
            script.push_str(&format!("sleep {secs}\n"));
        }
        script.push_str(&format!("exit {}\n", self.exit_code));

        std::fs::write(&path, script).expect("write fake assistant script");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
        }
        path
    }
}

fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}
