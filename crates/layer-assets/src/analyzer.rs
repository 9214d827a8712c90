//! Layer name analysis interface
//!
//! The naming grammar lives outside this crate. An analyzer turns one layer
//! name into zero or more components, each optionally accompanied by the
//! problems found while parsing it.

use std::fmt;

use crate::component::Component;

/// A problem found while analyzing a layer name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisError {
    pub message: String,
}

impl AnalysisError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of analyzing one fragment of a layer name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    pub component: Option<Component>,
    pub errors: Vec<AnalysisError>,
}

impl AnalysisResult {
    pub fn component(component: Component) -> Self {
        Self {
            component: Some(component),
            errors: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            component: None,
            errors: vec![AnalysisError::new(message)],
        }
    }
}

/// Parses layer names into components.
pub trait NameAnalyzer: Send + Sync {
    fn analyze(&self, name: &str) -> Vec<AnalysisResult>;
}

impl<F> NameAnalyzer for F
where
    F: Fn(&str) -> Vec<AnalysisResult> + Send + Sync,
{
    fn analyze(&self, name: &str) -> Vec<AnalysisResult> {
        self(name)
    }
}
