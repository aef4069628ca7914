//! Scripted failure injection
//!
//! Lets tests make a backend fail the next N reads or commits with a given
//! error code, or fail every read permanently, without touching the code
//! under test.

use dataaccess_core::DataError;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Plan {
    reads: u32,
    read_code: String,
    commits: u32,
    commit_code: String,
    permanent_read: Option<String>,
}

/// Failure script consulted by a backend before each read and commit
#[derive(Debug, Default)]
pub struct FaultInjector {
    plan: Mutex<Plan>,
}

impl FaultInjector {
    /// Injector that never fails
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` reads with backend error `code`
    pub fn fail_reads(&self, count: u32, code: impl Into<String>) {
        let mut plan = self.plan.lock();
        plan.reads = count;
        plan.read_code = code.into();
    }

    /// Fail the next `count` scope completions with backend error `code`
    pub fn fail_commits(&self, count: u32, code: impl Into<String>) {
        let mut plan = self.plan.lock();
        plan.commits = count;
        plan.commit_code = code.into();
    }

    /// Fail every read with an uncoded backend error until [`reset`](Self::reset)
    pub fn fail_reads_permanently(&self, message: impl Into<String>) {
        self.plan.lock().permanent_read = Some(message.into());
    }

    /// Clear every scripted failure
    pub fn reset(&self) {
        *self.plan.lock() = Plan::default();
    }

    /// Error the next read should fail with, consuming one scripted failure
    pub fn next_read_fault(&self) -> Option<DataError> {
        let mut plan = self.plan.lock();
        if let Some(message) = &plan.permanent_read {
            return Some(DataError::backend(message.clone()));
        }
        if plan.reads > 0 {
            plan.reads -= 1;
            return Some(DataError::backend_code(
                plan.read_code.clone(),
                "injected read failure",
            ));
        }
        None
    }

    /// Error the next commit should fail with, consuming one scripted failure
    pub fn next_commit_fault(&self) -> Option<DataError> {
        let mut plan = self.plan.lock();
        if plan.commits > 0 {
            plan.commits -= 1;
            return Some(DataError::backend_code(
                plan.commit_code.clone(),
                "injected commit failure",
            ));
        }
        None
    }
}
