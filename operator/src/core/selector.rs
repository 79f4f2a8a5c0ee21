//! Deterministic technique selection and platform filtering.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::core::error::RunError;
use crate::core::platform::Platform;
use crate::core::types::{AtomicTest, Technique, Techniques};

/// Which techniques a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TechniqueSelector {
    All,
    Technique(String),
}

impl FromStr for TechniqueSelector {
    type Err = Infallible;

    /// `all` (any case) selects everything; anything else is a technique id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            Ok(TechniqueSelector::All)
        } else {
            Ok(TechniqueSelector::Technique(trimmed.to_string()))
        }
    }
}

impl fmt::Display for TechniqueSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TechniqueSelector::All => f.write_str("All"),
            TechniqueSelector::Technique(id) => f.write_str(id),
        }
    }
}

/// Resolve the selector against the loaded techniques.
///
/// Fails with [`RunError::UnknownTechnique`] before returning anything when a
/// named technique is absent, so no test runs for a bad selector.
pub fn select_techniques<'a>(
    techniques: &'a Techniques,
    selector: &TechniqueSelector,
) -> Result<Vec<&'a Technique>, RunError> {
    match selector {
        TechniqueSelector::All => Ok(techniques.values().collect()),
        TechniqueSelector::Technique(id) => techniques
            .get(id)
            .map(|technique| vec![technique])
            .ok_or_else(|| RunError::UnknownTechnique(id.clone())),
    }
}

/// A test is eligible when it declares no platforms or lists the current one.
pub fn is_eligible(test: &AtomicTest, platform: Platform) -> bool {
    test.supported_platforms.is_empty()
        || test
            .supported_platforms
            .iter()
            .any(|declared| declared.trim().eq_ignore_ascii_case(platform.as_str()))
}

/// Tests of `technique` eligible on `platform`, in declared order.
pub fn eligible_tests(
    technique: &Technique,
    platform: Platform,
) -> impl Iterator<Item = &AtomicTest> {
    technique
        .atomic_tests
        .iter()
        .filter(move |test| is_eligible(test, platform))
}
