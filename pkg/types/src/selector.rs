use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    Exists(String),
}

/// Label selector: comma-separated `key=value` (exact match) and bare `key`
/// (existence) terms, all of which must hold. The empty selector matches
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| match r {
            Requirement::Equals(k, v) => labels.get(k) == Some(v),
            Requirement::Exists(k) => labels.contains_key(k),
        })
    }
}

impl FromStr for LabelSelector {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut requirements = Vec::new();
        for term in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let requirement = match term.split_once('=') {
                Some((key, value)) => {
                    let key = key.trim();
                    let value = value.trim();
                    if key.is_empty() || value.contains('=') {
                        return Err(ApiError::Invalid(format!(
                            "malformed selector term '{}'",
                            term
                        )));
                    }
                    Requirement::Equals(key.to_string(), value.to_string())
                }
                None => {
                    if term.contains(char::is_whitespace) {
                        return Err(ApiError::Invalid(format!(
                            "malformed selector term '{}'",
                            term
                        )));
                    }
                    Requirement::Exists(term.to_string())
                }
            };
            requirements.push(requirement);
        }
        Ok(Self { requirements })
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .requirements
            .iter()
            .map(|r| match r {
                Requirement::Equals(k, v) => format!("{}={}", k, v),
                Requirement::Exists(k) => k.clone(),
            })
            .collect();
        f.write_str(&terms.join(","))
    }
}
