// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted subprocess runner for tests: canned responses keyed by argv
//! substring, and a recording of every command issued.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ErrorKind, QuernError, Result, Tool};
use crate::runner::{ToolOutput, ToolRunner};

/// One canned response: the first rule whose `needle` appears in the joined
/// argv wins.
#[derive(Clone)]
pub struct ScriptRule {
    pub needle: String,
    pub stdout: String,
    pub code: i32,
}

/// A [`ToolRunner`] that never spawns anything.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<ScriptRule>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Respond to any command whose argv contains `needle`.
    pub fn respond(&self, needle: &str, stdout: &str) {
        self.rules.lock().push(ScriptRule {
            needle: needle.to_owned(),
            stdout: stdout.to_owned(),
            code: 0,
        });
    }

    /// Respond with a non-zero exit.
    pub fn fail(&self, needle: &str, code: i32) {
        self.rules.lock().push(ScriptRule { needle: needle.to_owned(), stdout: String::new(), code });
    }

    /// Every recorded command, as `tool arg1 arg2 ...` strings.
    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn respond_to(&self, tool: &str, args: &[String]) -> ToolOutput {
        let joined = format!("{tool} {}", args.join(" "));
        self.calls.lock().push(joined.clone());
        let rules = self.rules.lock();
        match rules.iter().find(|r| joined.contains(&r.needle)) {
            Some(rule) => ToolOutput { stdout: rule.stdout.clone(), stderr: String::new(), code: Some(rule.code) },
            None => ToolOutput { stdout: String::new(), stderr: String::new(), code: Some(0) },
        }
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, tool: &str, tag: Tool, args: &[String]) -> Result<ToolOutput> {
        let output = self.respond_to(tool, args);
        if output.code == Some(0) {
            Ok(output)
        } else {
            Err(QuernError::tool(
                ErrorKind::SubprocessFailed,
                tag,
                format!("{tool} exited with {:?}", output.code),
            ))
        }
    }

    async fn run_unchecked(&self, tool: &str, _tag: Tool, args: &[String]) -> Result<ToolOutput> {
        Ok(self.respond_to(tool, args))
    }
}
