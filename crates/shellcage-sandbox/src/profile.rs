use crate::rule::SandboxRule;

/// A rendered sandbox profile together with the rules it was rendered from.
///
/// Built fresh for every invocation and handed to the wrapper by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProfile {
    rules: Vec<SandboxRule>,
    text: String,
}

impl CompiledProfile {
    pub(crate) fn new(rules: Vec<SandboxRule>, text: String) -> Self {
        Self { rules, text }
    }

    pub fn rules(&self) -> &[SandboxRule] {
        &self.rules
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
