//! Ordered transform steps.
//!
//! Each task that rewrites file contents describes its work as a list of
//! [`Step`]s. A step maps one [`Artifact`] to the next; the [`Pipeline`]
//! applies them in order and stops at the first error.

use camino::Utf8PathBuf;

/// File contents travelling through a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Path of the source this artifact was read from.
    pub source: Utf8PathBuf,
    pub bytes: Vec<u8>,
    /// Source map accompanying the bytes, if a step produced one.
    pub map: Option<String>,
}

impl Artifact {
    pub fn new(source: impl Into<Utf8PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: source.into(),
            bytes: bytes.into(),
            map: None,
        }
    }

    /// Contents as UTF-8 text.
    pub fn text(&self) -> anyhow::Result<&str> {
        Ok(std::str::from_utf8(&self.bytes)?)
    }
}

/// A single transformation of file contents.
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, input: Artifact) -> anyhow::Result<Artifact>;
}

/// Steps applied one after another.
#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn run(&self, input: Artifact) -> anyhow::Result<Artifact> {
        self.steps.iter().try_fold(input, |artifact, step| {
            let source = artifact.source.clone();
            step.apply(artifact)
                .map_err(|e| e.context(format!("{} failed on {}", step.name(), source)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl Step for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn apply(&self, input: Artifact) -> anyhow::Result<Artifact> {
            Ok(Artifact {
                bytes: input.bytes.to_ascii_uppercase(),
                ..input
            })
        }
    }

    struct Exclaim;

    impl Step for Exclaim {
        fn name(&self) -> &'static str {
            "exclaim"
        }

        fn apply(&self, mut input: Artifact) -> anyhow::Result<Artifact> {
            input.bytes.push(b'!');
            Ok(input)
        }
    }

    struct Fail;

    impl Step for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn apply(&self, _: Artifact) -> anyhow::Result<Artifact> {
            anyhow::bail!("broken")
        }
    }

    #[test]
    fn test_steps_apply_in_order() {
        let pipeline = Pipeline::new().then(Exclaim).then(Upper);

        let out = pipeline.run(Artifact::new("a.txt", "hi")).unwrap();
        assert_eq!(out.text().unwrap(), "HI!");
    }

    #[test]
    fn test_error_names_step_and_source() {
        let pipeline = Pipeline::new().then(Upper).then(Fail).then(Exclaim);

        let err = pipeline.run(Artifact::new("a.txt", "hi")).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("fail failed on a.txt"));
        assert!(msg.contains("broken"));
    }
}
