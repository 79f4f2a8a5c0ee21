//! Technique listing for `atomic-operator list`.

use serde::Serialize;

use crate::core::platform::Platform;
use crate::core::selector::eligible_tests;
use crate::core::types::Techniques;

/// One listed technique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TechniqueListing {
    pub id: String,
    pub display_name: String,
    pub tests: usize,
    /// Tests that would be dispatched on the listing platform.
    pub eligible_tests: usize,
}

pub fn list_techniques(techniques: &Techniques, platform: Platform) -> Vec<TechniqueListing> {
    techniques
        .values()
        .map(|technique| TechniqueListing {
            id: technique.attack_technique.clone(),
            display_name: technique.display_name.clone(),
            tests: technique.atomic_tests.len(),
            eligible_tests: eligible_tests(technique, platform).count(),
        })
        .collect()
}
