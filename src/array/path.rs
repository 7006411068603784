use crate::core::errors::{LockstepError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Absolute hierarchical path of a node inside the container, e.g.
/// `/entry_1/instrument_1/detector_1/data`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArrayPath {
    segments: Vec<String>,
}

impl ArrayPath {
    pub fn parse(path: &str) -> Result<Self> {
        let Some(rest) = path.strip_prefix('/') else {
            return Err(LockstepError::invalid_path(path, "must start at root '/'"));
        };
        if rest.is_empty() {
            return Err(LockstepError::invalid_path(path, "no path given"));
        }

        let mut segments = Vec::new();
        for segment in rest.split('/') {
            if segment.is_empty() {
                return Err(LockstepError::invalid_path(path, "empty segment"));
            }
            if segment == "." || segment == ".." {
                return Err(LockstepError::invalid_path(path, "relative segment"));
            }
            if segment.contains('\0') {
                return Err(LockstepError::invalid_path(path, "NUL byte in segment"));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, the name of the node itself
    pub fn name(&self) -> &str {
        // parse() guarantees at least one segment
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Parent grouping nodes from the outermost down, excluding the root
    pub fn ancestors(&self) -> Vec<ArrayPath> {
        (1..self.segments.len())
            .map(|n| ArrayPath {
                segments: self.segments[..n].to_vec(),
            })
            .collect()
    }
}

impl fmt::Display for ArrayPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for ArrayPath {
    type Err = LockstepError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for ArrayPath {
    type Error = LockstepError;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
