//! Message bodies
//!
//! Builders for the markdown bodies of the messages the engine produces.

use super::message::{Risk, TaskId};

/// Everything a reporter knows about a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Goal or task description; its first 120 characters become the summary
    pub description: String,
    pub repro_steps: String,
    pub code_snippet: String,
    /// Fence language for the code snippet (e.g. `rust`); may be empty
    pub code_language: String,
    pub error_message: String,
    pub stacktrace: String,
    pub iteration: u32,
}

impl ErrorReport {
    /// Create a report with the required parts
    pub fn new(
        description: impl Into<String>,
        repro_steps: impl Into<String>,
        code_snippet: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            repro_steps: repro_steps.into(),
            code_snippet: code_snippet.into(),
            code_language: String::new(),
            error_message: error_message.into(),
            stacktrace: String::new(),
            iteration: 1,
        }
    }

    /// Attach a stack trace or log excerpt
    pub fn with_stacktrace(mut self, stacktrace: impl Into<String>) -> Self {
        self.stacktrace = stacktrace.into();
        self
    }

    /// Set the code fence language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.code_language = language.into();
        self
    }

    /// Set the iteration (defaults to 1)
    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = iteration;
        self
    }

    pub fn body(&self) -> String {
        format!(
            "# Error Report\n\
             ## Goal / Task\n{}\n\
             ## How to reproduce\n{}\n\
             ## Related code\n```{}\n{}\n```\n\
             ## Error message\n```text\n{}\n```\n\
             ## Stack trace / logs\n```text\n{}\n```\n",
            self.description,
            self.repro_steps,
            self.code_language,
            self.code_snippet,
            self.error_message,
            self.stacktrace
        )
    }
}

/// A fixer's answer to an error report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixInstruction {
    pub task_id: TaskId,
    pub iteration: u32,
    pub risk: Risk,
    pub summary: String,
    pub cause: String,
    pub change: String,
    pub test_plan: String,
}

impl FixInstruction {
    pub fn new(task_id: TaskId, iteration: u32, summary: impl Into<String>) -> Self {
        Self {
            task_id,
            iteration,
            risk: Risk::Low,
            summary: summary.into(),
            cause: String::new(),
            change: String::new(),
            test_plan: String::new(),
        }
    }

    pub fn with_risk(mut self, risk: Risk) -> Self {
        self.risk = risk;
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = cause.into();
        self
    }

    pub fn with_change(mut self, change: impl Into<String>) -> Self {
        self.change = change.into();
        self
    }

    pub fn with_test_plan(mut self, test_plan: impl Into<String>) -> Self {
        self.test_plan = test_plan.into();
        self
    }

    pub fn body(&self) -> String {
        format!(
            "# Fix Instruction\n\
             ## 1) Root cause\n{}\n\
             ## 2) Change\n{}\n\
             ## 3) How to test\n{}\n",
            self.cause, self.change, self.test_plan
        )
    }
}

/// Body of an `ack_applied` message
pub fn applied_body(applied_summary: &str, test_result: &str) -> String {
    format!(
        "# ACK (Applied)\n\
         ## Applied changes\n{}\n\
         ## Re-run / test result\n```text\n{}\n```\n",
        applied_summary, test_result
    )
}

/// Body of an `ack_read` message
pub fn read_body(path_name: &str) -> String {
    format!("# ACK (Read)\nReceived `{}`.\n", path_name)
}

/// Body of a `status` message
pub fn status_body(note: &str) -> String {
    format!("# Status\n{}\n", note)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_report_body_sections() {
        let body = ErrorReport::new("Parse config", "run `app`", "let x = 1;", "boom")
            .with_language("rust")
            .with_stacktrace("at main.rs:3")
            .body();

        assert!(body.starts_with("# Error Report\n"));
        assert!(body.contains("## How to reproduce\nrun `app`\n"));
        assert!(body.contains("```rust\nlet x = 1;\n```"));
        assert!(body.contains("## Error message\n```text\nboom\n```"));
        assert!(body.contains("at main.rs:3"));
    }

    #[test]
    fn test_error_report_defaults() {
        let report = ErrorReport::new("d", "r", "c", "e");
        assert_eq!(report.iteration, 1);
        assert!(report.stacktrace.is_empty());
    }

    #[test]
    fn test_fix_instruction_body() {
        let id = TaskId::parse("T20260130-101500-AB").unwrap();
        let fix = FixInstruction::new(id, 2, "Guard empty input")
            .with_cause("unchecked index")
            .with_change("check len first")
            .with_test_plan("cargo test");

        assert_eq!(fix.risk, Risk::Low);
        let body = fix.body();
        assert!(body.contains("## 1) Root cause\nunchecked index\n"));
        assert!(body.contains("## 3) How to test\ncargo test\n"));
    }

    #[test]
    fn test_applied_body() {
        let body = applied_body("patched parser", "12 passed");
        assert!(body.contains("## Applied changes\npatched parser\n"));
        assert!(body.contains("```text\n12 passed\n```"));
    }
}
