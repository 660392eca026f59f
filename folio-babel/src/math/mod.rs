//! Equation markup conversion.
//!
//! Word-processing packages carry equations as OMML fragments. Downstream
//! blocks want LaTeX, so parsers hand every native fragment to a
//! [`MathConverter`]. Conversion is best effort: a converter reports failure
//! through [`MathConversion`] and never through a panic or an `Err`, and the
//! caller keeps the native fragment either way.

mod omml;

pub use omml::OmmlConverter;

use serde::{Deserialize, Serialize};

/// Outcome of one equation conversion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MathConversion {
    pub latex: Option<String>,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl MathConversion {
    pub fn success(latex: impl Into<String>) -> Self {
        Self {
            latex: Some(latex.into()),
            succeeded: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            latex: None,
            succeeded: false,
            error: Some(error.into()),
        }
    }
}

/// Converts native equation markup to LaTeX.
pub trait MathConverter: Send + Sync {
    fn convert(&self, native: &str) -> MathConversion;
}

/// A converter that always fails. Useful to exercise equation fallbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullConverter;

impl MathConverter for NullConverter {
    fn convert(&self, _native: &str) -> MathConversion {
        MathConversion::failure("no math converter configured")
    }
}
