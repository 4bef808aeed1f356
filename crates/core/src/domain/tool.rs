// Tool execution model: commands handed to the supervisor and what comes back

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stands in for the scratch folder in printed commands
pub const SCRATCH_PLACEHOLDER: &str = "$SCRATCH";

/// A concrete process execution: program plus discrete argument vector.
/// Never interpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout_override: Option<Duration>,
    /// Run to completion, in order, before this command. A step that does
    /// not exit 0 ends the run with its own outcome.
    pub setup: Vec<CommandSpec>,
    /// Arguments naming a file in the per-run scratch folder
    pub scratch_args: Vec<ScratchArg>,
}

/// Argument rewritten to `prefix` + `<scratch folder>/file_name` at run time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchArg {
    pub index: usize,
    pub prefix: String,
    pub file_name: String,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout_override: None,
            setup: Vec::new(),
            scratch_args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.push(arg);
        self
    }

    pub fn push(&mut self, arg: impl Into<String>) {
        self.args.push(arg.into());
    }

    /// Push `flag value` as two separate arguments
    pub fn push_pair(&mut self, flag: &str, value: impl Into<String>) {
        self.args.push(flag.to_string());
        self.args.push(value.into());
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    /// Push an argument naming `file_name` inside the scratch folder
    pub fn push_scratch(&mut self, prefix: &str, file_name: &str) {
        self.scratch_args.push(ScratchArg {
            index: self.args.len(),
            prefix: prefix.to_string(),
            file_name: file_name.to_string(),
        });
        self.args.push(format!("{prefix}{SCRATCH_PLACEHOLDER}/{file_name}"));
    }

    pub fn with_setup(mut self, step: CommandSpec) -> Self {
        self.setup.push(step);
        self
    }

    pub fn uses_scratch(&self) -> bool {
        !self.scratch_args.is_empty() || self.setup.iter().any(CommandSpec::uses_scratch)
    }

    /// Copy with every scratch argument pointing into `dir`
    pub fn in_scratch(&self, dir: &Path) -> CommandSpec {
        let mut resolved = self.clone();
        for scratch in &self.scratch_args {
            if let Some(arg) = resolved.args.get_mut(scratch.index) {
                *arg = format!("{}{}", scratch.prefix, dir.join(&scratch.file_name).display());
            }
        }
        resolved.scratch_args.clear();
        resolved.setup = self.setup.iter().map(|step| step.in_scratch(dir)).collect();
        resolved
    }

    /// Printable form for logs (arguments containing spaces are quoted).
    /// Setup steps come first, joined by `&&`.
    pub fn display(&self) -> String {
        self.setup
            .iter()
            .map(CommandSpec::display)
            .chain(std::iter::once(self.display_one()))
            .collect::<Vec<_>>()
            .join(" && ")
    }

    fn display_one(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("{part:?}")
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured process output handed to an adapter's parser
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

impl RawOutput {
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }
}

/// What to do when an adapter cannot recognize its tool's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFallback {
    /// Succeed with the raw stdout and flag the result as parse-degraded
    RawText,
    /// Fail the invocation
    Fail,
}

/// Make a value safe to use as a single path component
pub fn sanitize_file_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_start_matches('.') {
        "" => "_".to_string(),
        rest => rest.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_keeps_arguments_discrete() {
        let mut cmd = CommandSpec::new("nmap").arg("-Pn");
        cmd.push_pair("-p", "22,80");
        cmd.push("example.com; rm -rf /");

        assert_eq!(cmd.args, vec!["-Pn", "-p", "22,80", "example.com; rm -rf /"]);
        assert_eq!(cmd.display(), "nmap -Pn -p 22,80 \"example.com; rm -rf /\"");
    }

    #[test]
    fn test_scratch_arguments_resolve_per_run() {
        let mut render = CommandSpec::new("gs").arg("-q");
        render.push_scratch("-sOutputFile=", "pages.tif");
        let mut command = CommandSpec::new("tesseract").with_setup(render);
        command.push_scratch("", "pages.tif");
        command.push("stdout");

        assert!(command.uses_scratch());
        assert_eq!(
            command.display(),
            "gs -q -sOutputFile=$SCRATCH/pages.tif && tesseract $SCRATCH/pages.tif stdout"
        );

        let resolved = command.in_scratch(Path::new("/tmp/run1"));
        assert!(!resolved.uses_scratch());
        assert_eq!(resolved.args, vec!["/tmp/run1/pages.tif", "stdout"]);
        assert_eq!(resolved.setup[0].args, vec!["-q", "-sOutputFile=/tmp/run1/pages.tif"]);
    }

    #[test]
    fn test_sanitize_file_component() {
        assert_eq!(sanitize_file_component("example.com"), "example.com");
        assert_eq!(sanitize_file_component("10.0.0.0/24"), "10.0.0.0_24");
        assert_eq!(sanitize_file_component("../etc"), "_etc");
        assert_eq!(sanitize_file_component(".."), "_");
    }
}
