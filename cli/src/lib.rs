use retouch::{HarnessConfig, ParameterBag};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// One entry of a job script.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Resolve and apply an operation
    Apply {
        operation: String,
        #[serde(default)]
        params: ParameterBag,
    },
    /// Step back in history
    Undo,
    /// Step forward in history
    Redo,
}

/// An editing job: where the image comes from, what to do to it and where
/// the result goes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Job {
    pub input: String,
    pub output: String,
    #[serde(default)]
    pub harness: HarnessConfig,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Job {
    /// A small job showing every step kind.
    pub fn example() -> Self {
        let params = |value: serde_json::Value| match value {
            serde_json::Value::Object(map) => map,
            _ => ParameterBag::new(),
        };

        Self {
            input: "input.png".to_string(),
            output: "output.png".to_string(),
            harness: HarnessConfig::default(),
            steps: vec![
                Step::Apply {
                    operation: "brightness".to_string(),
                    params: params(serde_json::json!({ "brightness": 20 })),
                },
                Step::Apply {
                    operation: "rotate".to_string(),
                    params: params(serde_json::json!({ "angle": "90" })),
                },
                Step::Undo,
                Step::Apply {
                    operation: "blur".to_string(),
                    params: params(serde_json::json!({ "intensity": "medium" })),
                },
            ],
        }
    }

    /// Load a job from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, JobError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load a job from TOML string
    pub fn from_toml(content: &str) -> Result<Self, JobError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a job from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, JobError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load a job from JSON string
    pub fn from_json(content: &str) -> Result<Self, JobError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load the job
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, JobError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(JobError::UnsupportedFileFormat),
        }
    }

    /// Auto-detect file format and save the job
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), JobError> {
        let path_ref = path.as_ref();
        let content = match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => self.to_toml()?,
            Some("json") => self.to_json()?,
            _ => return Err(JobError::UnsupportedFileFormat),
        };
        fs::write(path, content)?;
        Ok(())
    }

    /// Convert the job to TOML string
    pub fn to_toml(&self) -> Result<String, JobError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    /// Convert the job to JSON string
    pub fn to_json(&self) -> Result<String, JobError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_from_toml() {
        let job = Job::from_toml(
            r#"
            input = "in.png"
            output = "out.png"

            [harness]
            workers = 2

            [[steps]]
            action = "apply"
            operation = "crop"
            params = { x = 0, y = 0, width = 10, height = 10 }

            [[steps]]
            action = "undo"
            "#,
        )
        .expect("Should parse TOML job");

        assert_eq!(job.harness.workers, 2);
        assert_eq!(job.harness.max_history, retouch::MAX_HISTORY);
        assert_eq!(job.steps.len(), 2);
        match &job.steps[0] {
            Step::Apply { operation, params } => {
                assert_eq!(operation, "crop");
                let op = retouch::resolve(operation, params).expect("Should resolve");
                assert_eq!(op, retouch::Operation::Crop(retouch::Crop::new(0, 0, 10, 10)));
            }
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(job.steps[1], Step::Undo);
    }

    #[test]
    fn test_job_from_json() {
        let job = Job::from_json(
            r#"{
                "input": "in.png",
                "output": "out.jpg",
                "steps": [
                    { "action": "apply", "operation": "rotate", "params": { "angle": 90 } },
                    { "action": "redo" }
                ]
            }"#,
        )
        .expect("Should parse JSON job");
        assert_eq!(job.steps[1], Step::Redo);
        assert_eq!(job.harness, HarnessConfig::default());
    }

    #[test]
    fn test_example_round_trips_through_toml() {
        let job = Job::example();
        let text = job.to_toml().expect("Should write TOML");
        assert_eq!(Job::from_toml(&text).expect("Should read TOML"), job);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            Job::from_file("job.yaml"),
            Err(JobError::UnsupportedFileFormat)
        ));
    }
}
