use crate::config::Toolchain;
use crate::error::Error;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Languages the executor knows how to build and run.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    C,
    Cpp,
    Java,
}

/// A program name plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    fn new(program: &str, args: &[&str]) -> Self {
        CommandLine {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Runs this command through `prefix`, e.g. `nsjail --mode=exec --`.
    /// An empty prefix leaves the command unchanged.
    pub fn wrapped_in(self, prefix: &[String]) -> CommandLine {
        match prefix.split_first() {
            None => self,
            Some((program, rest)) => {
                let mut args = rest.to_vec();
                args.push(self.program);
                args.extend(self.args);
                CommandLine {
                    program: program.clone(),
                    args,
                }
            }
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Name of the compiled binary for C and C++.
const BINARY_NAME: &str = "main";

impl Language {
    pub const ALL: [Language; 4] = [Language::Python, Language::C, Language::Cpp, Language::Java];

    pub fn tag(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
        }
    }

    /// File the submitted code is written to, relative to the workspace.
    /// Java requires the file to match its public class, so it is always `Main.java`.
    pub fn source_file(self) -> &'static str {
        match self {
            Language::Python => "main.py",
            Language::C => "main.c",
            Language::Cpp => "main.cpp",
            Language::Java => "Main.java",
        }
    }

    /// Compiler invocation, run with the workspace as working directory.
    pub fn compile_command(self, tools: &Toolchain) -> Option<CommandLine> {
        let source = self.source_file();
        match self {
            Language::Python => None,
            Language::C => Some(CommandLine::new(&tools.cc, &[source, "-o", BINARY_NAME])),
            Language::Cpp => Some(CommandLine::new(&tools.cxx, &[source, "-o", BINARY_NAME])),
            Language::Java => Some(CommandLine::new(&tools.javac, &[source])),
        }
    }

    /// Command that runs the (compiled) program inside `workspace`.
    pub fn run_command(self, tools: &Toolchain, workspace: &Path) -> CommandLine {
        match self {
            Language::Python => CommandLine::new(&tools.python, &[self.source_file()]),
            Language::C | Language::Cpp => {
                let binary = workspace.join(BINARY_NAME);
                CommandLine::new(&binary.to_string_lossy(), &[])
            }
            Language::Java => CommandLine::new(&tools.java, &["-cp", ".", "Main"]),
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .iter()
            .copied()
            .find(|lang| lang.tag() == tag)
            .ok_or_else(|| Error::UnsupportedLanguage(tag.to_string()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
