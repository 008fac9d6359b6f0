use std::fmt;

use serde_derive::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CheckSeverity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub category: String,
    pub name: String,
    pub severity: CheckSeverity,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    fn new(category: &str, name: &str, severity: CheckSeverity, status: CheckStatus, detail: String) -> Self {
        CheckResult {
            category: category.to_string(),
            name: name.to_string(),
            severity,
            status,
            detail,
        }
    }

    pub fn passed(category: &str, name: &str, severity: CheckSeverity, detail: impl Into<String>) -> Self {
        CheckResult::new(category, name, severity, CheckStatus::Passed, detail.into())
    }

    pub fn failed(category: &str, name: &str, severity: CheckSeverity, detail: impl Into<String>) -> Self {
        CheckResult::new(category, name, severity, CheckStatus::Failed, detail.into())
    }

    pub fn skipped(category: &str, name: &str, severity: CheckSeverity, detail: impl Into<String>) -> Self {
        CheckResult::new(category, name, severity, CheckStatus::Skipped, detail.into())
    }

    /// `passed` when `ok`, `failed` otherwise.
    pub fn from_bool(category: &str, name: &str, severity: CheckSeverity, ok: bool, detail: impl Into<String>) -> Self {
        match ok {
            true => CheckResult::passed(category, name, severity, detail),
            false => CheckResult::failed(category, name, severity, detail),
        }
    }

    pub fn is_critical_failure(&self) -> bool {
        self.severity == CheckSeverity::Critical && self.status == CheckStatus::Failed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub namespace: String,
    pub environment: String,
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    pub fn new(namespace: &str, environment: &str) -> Self {
        ValidationReport {
            namespace: namespace.to_string(),
            environment: environment.to_string(),
            checks: vec![],
        }
    }

    pub fn record(&mut self, check: CheckResult) {
        match (check.status, check.severity) {
            (CheckStatus::Passed, _) => debug!("[{}] {}: passed", check.category, check.name),
            (CheckStatus::Skipped, _) => debug!("[{}] {}: skipped, {}", check.category, check.name, check.detail),
            (CheckStatus::Failed, CheckSeverity::Warning) => {
                warn!("[{}] {}: {}", check.category, check.name, check.detail)
            }
            (CheckStatus::Failed, CheckSeverity::Critical) => {
                error!("[{}] {}: {}", check.category, check.name, check.detail)
            }
        }
        self.checks.push(check);
    }

    pub fn extend(&mut self, checks: Vec<CheckResult>) {
        checks.into_iter().for_each(|c| self.record(c));
    }

    /// Failed warnings are counted apart from failed critical checks.
    pub fn tally(&self) -> Tally {
        self.checks.iter().fold(Tally::default(), |mut tally, check| {
            match (check.status, check.severity) {
                (CheckStatus::Passed, _) => tally.passed += 1,
                (CheckStatus::Skipped, _) => tally.skipped += 1,
                (CheckStatus::Failed, CheckSeverity::Critical) => tally.failed += 1,
                (CheckStatus::Failed, CheckSeverity::Warning) => tally.warnings += 1,
            }
            tally
        })
    }

    pub fn has_critical_failure(&self) -> bool {
        self.checks.iter().any(|c| c.is_critical_failure())
    }

    pub fn exit_code(&self) -> i32 {
        match self.has_critical_failure() {
            true => 1,
            false => 0,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct JsonReport<'a> {
            #[serde(flatten)]
            report: &'a ValidationReport,
            summary: Tally,
            success: bool,
        }

        serde_json::to_string_pretty(&JsonReport {
            report: self,
            summary: self.tally(),
            success: !self.has_critical_failure(),
        })
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Validation of namespace {} (environment {})",
            self.namespace, self.environment
        )?;

        let mut category = None;
        for check in &self.checks {
            if category != Some(check.category.as_str()) {
                category = Some(check.category.as_str());
                writeln!(f, "\n[{}]", check.category)?;
            }
            let mark = match (check.status, check.severity) {
                (CheckStatus::Passed, _) => "PASS",
                (CheckStatus::Skipped, _) => "SKIP",
                (CheckStatus::Failed, CheckSeverity::Critical) => "FAIL",
                (CheckStatus::Failed, CheckSeverity::Warning) => "WARN",
            };
            match check.detail.is_empty() {
                true => writeln!(f, "  {mark}  {}", check.name)?,
                false => writeln!(f, "  {mark}  {}: {}", check.name, check.detail)?,
            }
        }

        let tally = self.tally();
        writeln!(
            f,
            "\n{} passed, {} failed, {} warning(s), {} skipped",
            tally.passed, tally.failed, tally.warnings, tally.skipped
        )?;
        match self.has_critical_failure() {
            true => write!(f, "Result: FAILED"),
            false => write!(f, "Result: OK"),
        }
    }
}
