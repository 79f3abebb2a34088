//! Maps a (language, mode) pair to a container image and an in-container shell command.

use crate::errors::{ExecutorError, Result};
use std::fmt;
use std::str::FromStr;

// Go keeps its build cache, module cache and temp files inside the workspace
// volume; the tmpfs at /tmp is too small for a cold build.
const GO_PRELUDE: &str = r#"
set -e
mkdir -p ./tmp ./.cache/go-build ./.cache/gomod
export TMPDIR="$PWD/tmp"
export GOTMPDIR="$PWD/tmp"
export GOCACHE="$PWD/.cache/go-build"
export GOMODCACHE="$PWD/.cache/gomod"
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Go,
    Python,
    Javascript,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::Python => "python",
            Language::Javascript => "javascript",
        }
    }
}

impl FromStr for Language {
    type Err = ExecutorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "go" => Ok(Language::Go),
            "python" => Ok(Language::Python),
            "javascript" => Ok(Language::Javascript),
            other => Err(ExecutorError::UnsupportedLanguage(other.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    GoTest,
    PythonUnittest,
    NodeTest,
    Run,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::GoTest => "go_test",
            Mode::PythonUnittest => "python_unittest",
            Mode::NodeTest => "node_test",
            Mode::Run => "run",
        }
    }
}

impl FromStr for Mode {
    type Err = ExecutorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "go_test" => Ok(Mode::GoTest),
            "python_unittest" => Ok(Mode::PythonUnittest),
            "node_test" => Ok(Mode::NodeTest),
            "run" => Ok(Mode::Run),
            other => Err(ExecutorError::UnsupportedMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container image per language toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSet {
    pub go: String,
    pub python: String,
    pub node: String,
}

impl Default for ImageSet {
    fn default() -> Self {
        Self {
            go: "golang:1.22-alpine".to_string(),
            python: "python:3.12-alpine".to_string(),
            node: "node:20-alpine".to_string(),
        }
    }
}

impl ImageSet {
    pub fn for_language(&self, language: Language) -> &str {
        match language {
            Language::Go => &self.go,
            Language::Python => &self.python,
            Language::Javascript => &self.node,
        }
    }
}

/// Resolved image and `sh -c` script for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    pub image: String,
    pub script: String,
}

/// Resolves the image and shell script for a request.
///
/// Mode is checked first: the test modes imply their toolchain and ignore
/// `language`, while `run` needs `language` to choose the entrypoint.
pub fn build_command(language: &str, mode: &str, images: &ImageSet) -> Result<CommandPlan> {
    let mode: Mode = mode.parse()?;
    let (toolchain, script) = match mode {
        Mode::GoTest => (Language::Go, format!("{GO_PRELUDE}go test ./... -count=1\n")),
        Mode::PythonUnittest => (
            Language::Python,
            r#"python -m unittest discover -s . -p "test_*.py" -q"#.to_string(),
        ),
        Mode::NodeTest => (Language::Javascript, "node --test".to_string()),
        Mode::Run => {
            let language: Language = language.parse()?;
            let script = match language {
                Language::Go => format!("{GO_PRELUDE}go run .\n"),
                Language::Python => "python main.py".to_string(),
                Language::Javascript => "node main.js".to_string(),
            };
            (language, script)
        }
    };

    Ok(CommandPlan {
        image: images.for_language(toolchain).to_string(),
        script,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_mode_selects_entrypoint_by_language() {
        let images = ImageSet::default();

        let py = build_command("python", "run", &images).unwrap();
        assert_eq!(py.image, "python:3.12-alpine");
        assert_eq!(py.script, "python main.py");

        let js = build_command("javascript", "run", &images).unwrap();
        assert_eq!(js.image, "node:20-alpine");
        assert_eq!(js.script, "node main.js");

        let go = build_command("go", "run", &images).unwrap();
        assert_eq!(go.image, "golang:1.22-alpine");
        assert!(go.script.trim_end().ends_with("go run ."));
        assert!(go.script.contains("GOCACHE=\"$PWD/.cache/go-build\""));
    }

    #[test]
    fn test_run_mode_rejects_unknown_language() {
        let err = build_command("ruby", "run", &ImageSet::default()).unwrap_err();
        assert!(matches!(err, ExecutorError::UnsupportedLanguage(ref l) if l == "ruby"));
        assert!(err.to_string().contains("unsupported language"));
    }

    #[test]
    fn test_unknown_mode_is_rejected_before_language() {
        let err = build_command("ruby", "benchmark", &ImageSet::default()).unwrap_err();
        assert!(err.to_string().contains("unsupported mode: benchmark"));
    }

    #[test]
    fn test_test_modes_ignore_language_field() {
        let images = ImageSet::default();

        let go = build_command("python", "go_test", &images).unwrap();
        assert_eq!(go.image, images.go);
        assert!(go.script.contains("go test ./... -count=1"));
        assert!(go.script.contains("export TMPDIR=\"$PWD/tmp\""));

        let py = build_command("anything", "python_unittest", &images).unwrap();
        assert_eq!(py.image, images.python);
        assert!(py.script.contains("-p \"test_*.py\""));

        let node = build_command("go", "node_test", &images).unwrap();
        assert_eq!(node.image, images.node);
        assert_eq!(node.script, "node --test");
    }

    #[test]
    fn test_configured_images_are_used_for_every_mode() {
        let images = ImageSet {
            go: "registry.local/go:pinned".to_string(),
            python: "registry.local/py:pinned".to_string(),
            node: "registry.local/node:pinned".to_string(),
        };

        assert_eq!(build_command("go", "go_test", &images).unwrap().image, images.go);
        assert_eq!(build_command("go", "run", &images).unwrap().image, images.go);
        assert_eq!(
            build_command("python", "python_unittest", &images).unwrap().image,
            images.python
        );
        assert_eq!(build_command("javascript", "node_test", &images).unwrap().image, images.node);
    }

    #[test]
    fn test_enum_round_trip_through_str() {
        for mode in [Mode::GoTest, Mode::PythonUnittest, Mode::NodeTest, Mode::Run] {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
        for language in [Language::Go, Language::Python, Language::Javascript] {
            assert_eq!(language.to_string().parse::<Language>().unwrap(), language);
        }
    }
}
