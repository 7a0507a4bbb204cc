// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-side mirror of intercept and mock rules.
//!
//! The server is the single writer of rule state. The interceptor echoes
//! rule changes back as status events; echoes for rules this server
//! originated are ignored so a late echo cannot clobber a newer update.

use std::collections::HashSet;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

use super::protocol::InterceptPhase;
use crate::error::{QuernError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct InterceptRule {
    pub rule_id: String,
    pub pattern: String,
    pub phase: InterceptPhase,
}

#[derive(Debug, Clone, Serialize)]
pub struct MockRule {
    pub rule_id: String,
    pub pattern: String,
    pub status_code: u16,
    pub headers: IndexMap<String, Vec<String>>,
    pub body: String,
}

#[derive(Default)]
pub struct RuleStore {
    intercepts: Mutex<Vec<InterceptRule>>,
    mocks: Mutex<Vec<MockRule>>,
    /// Rule ids this server originated; echoes for these are dropped.
    originated: Mutex<HashSet<String>>,
    counter: std::sync::atomic::AtomicU64,
}

impl RuleStore {
    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
        format!("{prefix}-{n}")
    }

    pub fn add_intercept(&self, pattern: String, phase: InterceptPhase) -> InterceptRule {
        let rule = InterceptRule { rule_id: self.next_id("intercept"), pattern, phase };
        self.originated.lock().insert(rule.rule_id.clone());
        self.intercepts.lock().push(rule.clone());
        rule
    }

    /// Remove one intercept (or all, with `None`). Returns the removed ids.
    pub fn clear_intercepts(&self, rule_id: Option<&str>) -> Vec<String> {
        let mut intercepts = self.intercepts.lock();
        let removed: Vec<String> = match rule_id {
            Some(id) => {
                let before = intercepts.len();
                intercepts.retain(|r| r.rule_id != id);
                if intercepts.len() == before {
                    Vec::new()
                } else {
                    vec![id.to_owned()]
                }
            }
            None => intercepts.drain(..).map(|r| r.rule_id).collect(),
        };
        removed
    }

    pub fn add_mock(
        &self,
        pattern: String,
        status_code: u16,
        headers: IndexMap<String, Vec<String>>,
        body: String,
    ) -> Result<MockRule> {
        let mut mocks = self.mocks.lock();
        if mocks.iter().any(|m| m.pattern == pattern) {
            return Err(QuernError::conflict(format!(
                "a mock for pattern {pattern:?} already exists"
            )));
        }
        let rule =
            MockRule { rule_id: self.next_id("mock"), pattern, status_code, headers, body };
        self.originated.lock().insert(rule.rule_id.clone());
        mocks.push(rule.clone());
        Ok(rule)
    }

    pub fn update_mock(
        &self,
        rule_id: &str,
        pattern: Option<String>,
        status_code: Option<u16>,
        headers: Option<IndexMap<String, Vec<String>>>,
        body: Option<String>,
    ) -> Result<MockRule> {
        let mut mocks = self.mocks.lock();
        let rule = mocks
            .iter_mut()
            .find(|m| m.rule_id == rule_id)
            .ok_or_else(|| QuernError::not_found(format!("no mock rule {rule_id}")))?;
        if let Some(pattern) = pattern {
            rule.pattern = pattern;
        }
        if let Some(status_code) = status_code {
            rule.status_code = status_code;
        }
        if let Some(headers) = headers {
            rule.headers = headers;
        }
        if let Some(body) = body {
            rule.body = body;
        }
        // An update re-originates the rule: a stale echo from the previous
        // revision must not clobber this one.
        self.originated.lock().insert(rule_id.to_owned());
        Ok(rule.clone())
    }

    pub fn clear_mocks(&self, rule_id: Option<&str>) -> Vec<String> {
        let mut mocks = self.mocks.lock();
        match rule_id {
            Some(id) => {
                let before = mocks.len();
                mocks.retain(|m| m.rule_id != id);
                if mocks.len() == before {
                    Vec::new()
                } else {
                    vec![id.to_owned()]
                }
            }
            None => mocks.drain(..).map(|m| m.rule_id).collect(),
        }
    }

    pub fn intercepts(&self) -> Vec<InterceptRule> {
        self.intercepts.lock().clone()
    }

    pub fn mocks(&self) -> Vec<MockRule> {
        self.mocks.lock().clone()
    }

    /// Handle a rule echo from the interceptor. Returns `true` when the echo
    /// was ignored because this server originated the rule.
    pub fn on_rule_echo(&self, rule_id: &str) -> bool {
        if self.originated.lock().contains(rule_id) {
            tracing::debug!(rule_id, "ignoring echo for server-originated rule");
            true
        } else {
            tracing::debug!(rule_id, "echo for foreign rule");
            false
        }
    }

    pub fn clear_all(&self) {
        self.intercepts.lock().clear();
        self.mocks.lock().clear();
        self.originated.lock().clear();
    }
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
