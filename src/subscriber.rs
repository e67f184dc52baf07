//! Subscriber identifiers. A chat id is accepted only as an all-digit string;
//! unresolved template values (`{{chat_id}}`, `${ID}`) get their own error so
//! misconfigured integrations are easy to spot in logs.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").expect("digits regex"));
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{|\}\}|\$\{|[<>%]").expect("placeholder regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriberIdError {
    #[error("subscriber id is empty")]
    Empty,
    #[error("subscriber id looks like an unresolved placeholder: {0}")]
    Placeholder(String),
    #[error("subscriber id must be numeric: {0}")]
    NotNumeric(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn parse(raw: &str) -> Result<Self, SubscriberIdError> {
        let t = raw.trim();
        if t.is_empty() {
            return Err(SubscriberIdError::Empty);
        }
        if is_placeholder(t) {
            return Err(SubscriberIdError::Placeholder(t.to_string()));
        }
        if !DIGITS.is_match(t) {
            return Err(SubscriberIdError::NotNumeric(t.to_string()));
        }
        Ok(Self(t.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn is_placeholder(raw: &str) -> bool {
    PLACEHOLDER.is_match(raw)
}

impl FromStr for SubscriberId {
    type Err = SubscriberIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
