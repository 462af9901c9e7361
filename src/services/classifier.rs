//! Transition classification between two consecutive zone readings

use crate::domain::{Transition, ZoneName};

/// Classify the change from `previous` to `current`
///
/// Returns None when the zone did not change, including staying outside all
/// zones. Persistence and logging are the caller's business.
pub fn classify(previous: Option<&ZoneName>, current: Option<&ZoneName>) -> Option<Transition> {
    match (previous, current) {
        (prev, cur) if prev == cur => None,
        (None, Some(zone)) => Some(Transition::Entered { zone: zone.clone() }),
        (Some(zone), None) => Some(Transition::Exited { zone: zone.clone() }),
        (Some(from), Some(to)) => Some(Transition::Moved { from: from.clone(), to: to.clone() }),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_transition_when_unchanged() {
        let a = ZoneName::new("A");
        assert_eq!(classify(None, None), None);
        assert_eq!(classify(Some(&a), Some(&a)), None);
        assert_eq!(classify(Some(&a), Some(&ZoneName::new("A"))), None);
    }

    #[test]
    fn test_entered() {
        let a = ZoneName::new("A");
        assert_eq!(classify(None, Some(&a)), Some(Transition::Entered { zone: a }));
    }

    #[test]
    fn test_exited() {
        let a = ZoneName::new("A");
        assert_eq!(classify(Some(&a), None), Some(Transition::Exited { zone: a }));
    }

    #[test]
    fn test_moved() {
        let a = ZoneName::new("A");
        let b = ZoneName::new("B");
        assert_eq!(
            classify(Some(&a), Some(&b)),
            Some(Transition::Moved { from: a.clone(), to: b.clone() })
        );
        assert_eq!(classify(Some(&b), Some(&a)), Some(Transition::Moved { from: b, to: a }));
    }
}
