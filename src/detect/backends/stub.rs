use anyhow::{bail, Result};
use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;

/// Stub backend for demos. Loads instantly and never detects anything.
#[derive(Default)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn class_name(&self, _class_id: u32) -> Option<&str> {
        None
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<RawDetection>> {
        Ok(Vec::new())
    }
}

enum Step {
    Detections(Vec<RawDetection>),
    Fail(String),
}

/// Backend that replays a fixed script, one step per `detect` call.
///
/// Once the script runs out every further frame yields no detections.
pub struct ScriptedBackend {
    class_names: Vec<String>,
    steps: VecDeque<Step>,
}

impl ScriptedBackend {
    pub fn new<I, S>(class_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            class_names: class_names.into_iter().map(Into::into).collect(),
            steps: VecDeque::new(),
        }
    }

    /// Append the detections for the next frame.
    pub fn then(mut self, detections: Vec<RawDetection>) -> Self {
        self.steps.push_back(Step::Detections(detections));
        self
    }

    /// Append `count` frames with no detections.
    pub fn then_empty(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.steps.push_back(Step::Detections(Vec::new()));
        }
        self
    }

    /// Append a frame on which the backend reports an inference error.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push_back(Step::Fail(message.into()));
        self
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn class_name(&self, class_id: u32) -> Option<&str> {
        self.class_names.get(class_id as usize).map(String::as_str)
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<RawDetection>> {
        match self.steps.pop_front() {
            Some(Step::Detections(detections)) => Ok(detections),
            Some(Step::Fail(message)) => bail!(message),
            None => Ok(Vec::new()),
        }
    }
}
