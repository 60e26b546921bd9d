//! Decision outcomes: verdicts and structured denials

use crate::classify::{Grant, OperationSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Denial taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DenialCode {
    /// Gate invoked with nothing to authorize access to
    #[serde(rename = "no-prior")]
    NoPrior,

    /// Action predicate entry without a `perm$` tag
    #[serde(rename = "no-perm-defined")]
    NoPermDefined,

    /// Specification matches none of the recognized variants
    #[serde(rename = "no-match")]
    NoMatch,

    #[serde(rename = "fail/allow")]
    FailAllow,

    #[serde(rename = "fail/act")]
    FailAct,

    #[serde(rename = "fail/entity-operation")]
    FailEntityOperation,

    #[serde(rename = "fail/own")]
    FailOwn,

    /// Required-mode access control rule not satisfied
    #[serde(rename = "fail/acl")]
    FailAcl,
}

impl DenialCode {
    pub const ALL: [DenialCode; 8] = [
        DenialCode::NoPrior,
        DenialCode::NoPermDefined,
        DenialCode::NoMatch,
        DenialCode::FailAllow,
        DenialCode::FailAct,
        DenialCode::FailEntityOperation,
        DenialCode::FailOwn,
        DenialCode::FailAcl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DenialCode::NoPrior => "no-prior",
            DenialCode::NoPermDefined => "no-perm-defined",
            DenialCode::NoMatch => "no-match",
            DenialCode::FailAllow => "fail/allow",
            DenialCode::FailAct => "fail/act",
            DenialCode::FailEntityOperation => "fail/entity-operation",
            DenialCode::FailOwn => "fail/own",
            DenialCode::FailAcl => "fail/acl",
        }
    }

    /// Access decisions (as opposed to configuration errors)
    pub fn is_access_denial(&self) -> bool {
        matches!(
            self,
            DenialCode::FailAllow
                | DenialCode::FailAct
                | DenialCode::FailEntityOperation
                | DenialCode::FailOwn
                | DenialCode::FailAcl
        )
    }
}

impl fmt::Display for DenialCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured denial returned instead of the handler's result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Denial {
    pub code: DenialCode,

    /// The offending request fields
    #[serde(default)]
    pub args: Value,

    /// Transport status, set on access denials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Granted opspec (`None` when no rule matched)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<String>,

    /// Required operation codes, or required roles for ACL denials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub need: Option<String>,

    /// Caller's owner id on ownership mismatches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Access control rule that denied the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    /// Offending specification entry (compile-time denials)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<Value>,
}

impl Denial {
    pub fn new(code: DenialCode, args: Value) -> Self {
        Self {
            code,
            args,
            status: None,
            allowed: None,
            need: None,
            owner: None,
            rule: None,
            entry: None,
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_allowed(mut self, grant: Option<&Grant>) -> Self {
        self.allowed = grant.map(|grant| grant.to_string());
        self
    }

    pub fn with_need(mut self, need: &OperationSet) -> Self {
        self.need = Some(need.to_string());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>, roles: &[String]) -> Self {
        self.rule = Some(rule.into());
        self.need = Some(roles.join(","));
        self
    }

    pub fn with_entry(mut self, entry: Value) -> Self {
        self.entry = Some(entry);
        self
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "perm/{}", self.code)?;
        if let Some(status) = self.status {
            write!(f, " ({})", status)?;
        }
        if let Some(need) = &self.need {
            write!(
                f,
                " need={} allowed={}",
                need,
                self.allowed.as_deref().unwrap_or("none")
            )?;
        }
        if let Some(owner) = &self.owner {
            write!(f, " owner={}", owner)?;
        }
        if let Some(rule) = &self.rule {
            write!(f, " rule='{}'", rule)?;
        }
        Ok(())
    }
}

/// Outcome of the synchronous decision step
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Forward the request unchanged
    Forward,

    /// Terminal denial
    Deny(Denial),

    /// Operation granted; ownership must be enforced before forwarding
    Enforce { owner: String },
}

impl Verdict {
    pub fn is_forward(&self) -> bool {
        matches!(self, Verdict::Forward)
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Verdict::Deny(denial) => Some(denial),
            _ => None,
        }
    }
}
