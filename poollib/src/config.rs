use std::path::PathBuf;

/// Where and how the sandbox runs job scripts.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Parent of every per-execution scratch directory. Created on demand.
    pub scratch_root: PathBuf,
    /// Interpreter invoked as `<shell> -c <script>`.
    pub shell: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("workpool-scratch"),
            shell: PathBuf::from("/bin/sh"),
        }
    }
}

impl SandboxConfig {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            ..Default::default()
        }
    }

    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }
}
