//! Follow-up job rules.
//!
//! A chain rule says that a successful job of one type spawns a job of another
//! type, carrying a correlating id forward from the parent's input.

use serde_json::{Map, Value};

use super::job::JobType;

/// Input key that correlates a parsed document with its assessment.
pub const ASSESSMENT_ID_KEY: &str = "assessmentId";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRule {
    pub from: JobType,
    pub to: JobType,
    /// Input key copied from the parent into the follow-up input.
    pub carry_key: &'static str,
}

impl ChainRule {
    /// Build the follow-up input, or `None` when the parent input lacks the key.
    pub fn follow_up_input(&self, parent_input: &Value) -> Option<Value> {
        let carried = parent_input.get(self.carry_key)?;
        if carried.is_null() {
            return None;
        }
        let mut follow_up = Map::new();
        follow_up.insert(self.carry_key.to_string(), carried.clone());
        Some(Value::Object(follow_up))
    }
}

/// The set of chain rules the processor consults after a success.
#[derive(Debug, Clone)]
pub struct ChainRules {
    rules: Vec<ChainRule>,
}

impl ChainRules {
    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: ChainRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rule_for(&self, job_type: JobType) -> Option<&ChainRule> {
        self.rules.iter().find(|r| r.from == job_type)
    }
}

impl Default for ChainRules {
    /// Parsing a document feeds gap detection for its assessment.
    fn default() -> Self {
        Self::none().with_rule(ChainRule {
            from: JobType::ParseDocument,
            to: JobType::GapDetection,
            carry_key: ASSESSMENT_ID_KEY,
        })
    }
}
