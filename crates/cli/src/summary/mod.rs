// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template-based digests over logs and flows. No model calls — every
//! sentence is composed from counted facts, and every summary returns a
//! monotone cursor so the next call can ask for the delta.

pub mod flows;
pub mod logs;
pub mod patterns;

pub use flows::{summarize_flows, FlowSummary};
pub use logs::{summarize_logs, LogSummary};

use std::time::Duration;

/// Default summary window when no cursor is supplied.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(300);

/// How many top patterns / slow requests a digest carries.
pub const TOP_N: usize = 5;
