//! Priority tests for rtk-core

use rtk_core::{priority, Priority};

#[test]
fn test_priority_creation() {
    assert_eq!(Priority::new(5).map(Priority::raw), Some(5));
}

#[test]
fn test_priority_zero_is_reserved() {
    assert!(Priority::new(0).is_none());
    assert!(Priority::IDLE.is_idle());
    assert!(!Priority::MIN.is_idle());
}

#[test]
fn test_priority_ordering() {
    let low = priority!(2);
    let high = priority!(9);
    assert!(high > low);
    assert!(low > Priority::IDLE);
    assert!(Priority::MAX >= high);
}

#[test]
fn test_priority_display() {
    assert_eq!(priority!(4).to_string(), "Priority(4)");
}
