use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Executor settings, read from the `runner` table of Rocket's configuration.
///
/// Every field has a default, so an absent `runner` table yields a usable config.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Directory under which every invocation gets its own scratch directory.
    pub work_root: PathBuf,
    /// Wall-clock limit for the run step, in seconds.
    pub run_timeout: u64,
    /// Wall-clock limit for the compile step, in seconds.
    pub compile_timeout: u64,
    /// JSON file mapping question ids to their test cases.
    pub test_cases: PathBuf,
    pub toolchain: Toolchain,
    /// Command prefix the run step is executed through, e.g.
    /// `["nsjail", "--mode=exec", "--"]`. Empty runs the program directly.
    pub sandbox: Vec<String>,
}

/// Names (or paths) of the external compilers and interpreters.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Toolchain {
    pub python: String,
    pub cc: String,
    pub cxx: String,
    pub javac: String,
    pub java: String,
}

impl Config {
    pub fn run_limit(&self) -> Duration {
        Duration::from_secs(self.run_timeout)
    }

    pub fn compile_limit(&self) -> Duration {
        Duration::from_secs(self.compile_timeout)
    }

    /// Rejects settings the executor cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.run_timeout == 0 {
            return Err("runner.run_timeout must be at least 1 second".to_string());
        }
        if self.compile_timeout == 0 {
            return Err("runner.compile_timeout must be at least 1 second".to_string());
        }
        let t = &self.toolchain;
        for (key, value) in [
            ("python", &t.python),
            ("cc", &t.cc),
            ("cxx", &t.cxx),
            ("javac", &t.javac),
            ("java", &t.java),
        ] {
            if value.trim().is_empty() {
                return Err(format!("runner.toolchain.{} must not be empty", key));
            }
        }
        if let Some(first) = self.sandbox.first() {
            if first.trim().is_empty() {
                return Err("runner.sandbox must start with a program name".to_string());
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            work_root: std::env::temp_dir().join("coderunner"),
            run_timeout: 5,
            compile_timeout: 10,
            test_cases: PathBuf::from("test_cases.json"),
            toolchain: Toolchain::default(),
            sandbox: Vec::new(),
        }
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        Toolchain {
            python: "python3".to_string(),
            cc: "gcc".to_string(),
            cxx: "g++".to_string(),
            javac: "javac".to_string(),
            java: "java".to_string(),
        }
    }
}
