// src/comparator.rs - Off-normal state decision
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transition announced when the active state changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionName {
    Active,
    Inactive,
}

impl TransitionName {
    pub fn for_state(active: bool) -> Self {
        if active {
            TransitionName::Active
        } else {
            TransitionName::Inactive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionName::Active => "Active",
            TransitionName::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for TransitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one comparator run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    /// Active state after the run
    pub active: bool,
    /// Set only when `active` differs from the state before the run
    pub transition: Option<TransitionName>,
}

/// Decide the alarm state from the last known normal and input values.
///
/// - either value unknown: inactive
/// - otherwise active iff the values are not exactly equal (no tolerance, no
///   type coercion)
///
/// A transition is reported only when the decided state differs from
/// `current_active`.
///
/// ```rust
/// use offnormal::comparator::{evaluate, TransitionName};
/// use offnormal::Value;
///
/// let eval = evaluate(Some(&Value::Int(42)), Some(&Value::Int(7)), false);
/// assert!(eval.active);
/// assert_eq!(eval.transition, Some(TransitionName::Active));
///
/// let again = evaluate(Some(&Value::Int(42)), Some(&Value::Int(7)), true);
/// assert_eq!(again.transition, None);
/// ```
pub fn evaluate(normal: Option<&Value>, input: Option<&Value>, current_active: bool) -> Evaluation {
    let active = match (normal, input) {
        (Some(normal), Some(input)) => !normal.exact_eq(input),
        _ => false,
    };

    Evaluation {
        active,
        transition: (active != current_active).then(|| TransitionName::for_state(active)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            (-5i64..5).prop_map(Value::Int),
            (-5i64..5).prop_map(|v| Value::Float(v as f64)),
            "[ab]{0,2}".prop_map(Value::String),
        ]
    }

    #[test]
    fn test_unknown_values_are_inactive() {
        let v = Value::Int(1);
        for (normal, input) in [(None, Some(&v)), (Some(&v), None), (None, None)] {
            assert!(!evaluate(normal, input, false).active);
            assert_eq!(evaluate(normal, input, false).transition, None);
            // Leaving an active state through the unknown branch still reports
            assert_eq!(evaluate(normal, input, true).transition, Some(TransitionName::Inactive));
        }
    }

    #[test]
    fn test_no_type_coercion() {
        let eval = evaluate(Some(&Value::Int(1)), Some(&Value::Bool(true)), false);
        assert!(eval.active);
        let eval = evaluate(Some(&Value::Float(2.0)), Some(&Value::Int(2)), false);
        assert!(eval.active);
    }

    proptest! {
        #[test]
        fn equal_pairs_are_inactive(v in arb_value(), current in any::<bool>()) {
            let eval = evaluate(Some(&v), Some(&v.clone()), current);
            prop_assert!(!eval.active);
            prop_assert_eq!(eval.transition.is_some(), current);
        }

        #[test]
        fn unequal_pairs_are_active(a in arb_value(), b in arb_value(), current in any::<bool>()) {
            prop_assume!(!a.exact_eq(&b));
            let eval = evaluate(Some(&a), Some(&b), current);
            prop_assert!(eval.active);
            prop_assert_eq!(eval.transition, (!current).then_some(TransitionName::Active));
        }
    }
}
