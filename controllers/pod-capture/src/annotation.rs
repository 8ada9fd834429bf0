//! Capture annotation parsing.
//!
//! A pod asks for a capture with `tcpdump.antrea.io: "<n>"`, where `n` is
//! the number of rotated files to keep.

use crate::event::PodSnapshot;
use std::collections::BTreeMap;
use thiserror::Error;

/// Annotation carrying the capture rotation count.
pub const CAPTURE_ANNOTATION: &str = "tcpdump.antrea.io";

/// The annotation is present but is not a positive base-10 integer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid tcpdump.antrea.io value: {value:?}")]
pub struct AnnotationError {
    pub value: String,
}

/// Desired capture state of a pod at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureRequest {
    Absent,
    Invalid(AnnotationError),
    Active(u32),
}

impl CaptureRequest {
    pub fn count(&self) -> Option<u32> {
        match self {
            Self::Active(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&PodSnapshot> for CaptureRequest {
    fn from(pod: &PodSnapshot) -> Self {
        interpret(&pod.annotations)
    }
}

/// Maps a pod's annotations to its capture request.
pub fn interpret(annotations: &BTreeMap<String, String>) -> CaptureRequest {
    match annotations.get(CAPTURE_ANNOTATION) {
        None => CaptureRequest::Absent,
        Some(value) => match parse_capture_count(value) {
            Ok(n) => CaptureRequest::Active(n),
            Err(e) => CaptureRequest::Invalid(e),
        },
    }
}

/// Parses a rotation count: a base-10 integer strictly greater than zero.
///
/// A leading `+` is accepted; whitespace, zero, negatives and values that
/// do not fit in `u32` are not.
pub fn parse_capture_count(value: &str) -> Result<u32, AnnotationError> {
    let invalid = || AnnotationError {
        value: value.to_string(),
    };

    let digits = value.strip_prefix('+').unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    match digits.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid()),
    }
}
