#![no_std]
#![deny(unsafe_code)]

//! # RTK Self-Test
//!
//! A small harness for running kernel checks on the target itself, where
//! `cargo test` is not available.
//!
//! A test case is a plain function taking an explicit fixture and returning a
//! [`CaseResult`]. [`run_suite`] runs a slice of cases against one fixture
//! and accumulates the outcome in a [`TestReport`] owned by the caller, so the
//! harness keeps no global state.
//!
//! ```ignore
//! let mut report: TestReport<8> = TestReport::new();
//! let mut fixture = PoolFixture::new(&POOL);
//! run_suite("pool", &suites::pool::cases(), &mut fixture, &mut report);
//! if !report.is_success() {
//!     for failure in report.failures() {
//!         log::error!("{}", failure);
//!     }
//! }
//! ```

use core::fmt;

use heapless::Vec;
use log::{error, info};

pub mod suites;

/// Why a test case failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failure {
    /// Name of the failed case, filled in by [`run_suite`]
    pub case: &'static str,
    /// The condition that did not hold
    pub message: &'static str,
    /// Source line of the check
    pub line: u32,
}

impl Failure {
    pub const fn new(message: &'static str, line: u32) -> Self {
        Self {
            case: "",
            message,
            line,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (line {})", self.case, self.message, self.line)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Failure {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}: {} (line {})", self.case, self.message, self.line)
    }
}

pub type CaseResult = Result<(), Failure>;

/// A named check against a fixture of type `C`
pub struct TestCase<C> {
    pub name: &'static str,
    pub run: fn(&mut C) -> CaseResult,
}

impl<C> TestCase<C> {
    pub const fn new(name: &'static str, run: fn(&mut C) -> CaseResult) -> Self {
        Self { name, run }
    }
}

impl<C> Clone for TestCase<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for TestCase<C> {}

/// Outcome of one or more suites
///
/// Keeps the first `F` failures; later ones are only counted.
#[derive(Debug, Default)]
pub struct TestReport<const F: usize> {
    passed: usize,
    failed: usize,
    failures: Vec<Failure, F>,
}

impl<const F: usize> TestReport<F> {
    pub const fn new() -> Self {
        Self {
            passed: 0,
            failed: 0,
            failures: Vec::new(),
        }
    }

    /// Add the result of the case named `case`
    pub fn record(&mut self, case: &'static str, result: CaseResult) {
        match result {
            Ok(()) => self.passed += 1,
            Err(mut failure) => {
                failure.case = case;
                self.failed += 1;
                // the count stays exact even when the list is full
                let _ = self.failures.push(failure);
            }
        }
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    /// True if at least one case ran and none failed
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.passed > 0
    }

    /// Failures kept in the report, oldest first
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }
}

/// Run every case of `cases` against `fixture` and record the outcomes
pub fn run_suite<C, const F: usize>(
    suite: &str,
    cases: &[TestCase<C>],
    fixture: &mut C,
    report: &mut TestReport<F>,
) {
    info!("suite {}: {} cases", suite, cases.len());
    for case in cases {
        let result = (case.run)(fixture);
        match &result {
            Ok(()) => info!("  {} ... ok", case.name),
            Err(failure) => error!(
                "  {} ... FAILED: {} (line {})",
                case.name, failure.message, failure.line
            ),
        }
        report.record(case.name, result);
    }
}

/// Fail the enclosing test case unless `cond` holds
#[macro_export]
macro_rules! ensure {
    ($cond:expr) => {
        $crate::ensure!($cond, stringify!($cond))
    };
    ($cond:expr, $message:expr) => {
        if !$cond {
            return Err($crate::Failure::new($message, line!()));
        }
    };
}

/// Fail the enclosing test case unless both sides compare equal
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => {
        $crate::ensure!(
            $left == $right,
            concat!(stringify!($left), " == ", stringify!($right))
        )
    };
}
