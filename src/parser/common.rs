use crate::token::Operator;

/// Binding power used by the expression parser's precedence-climbing loop.
/// Higher binds tighter; `None` means the operator never appears as a binary
/// infix operator.
pub fn infix_binding_power(op: Operator) -> Option<(u8, u8)> {
    use Operator::*;
    Some(match op {
        Or => (1, 2),
        And => (3, 4),
        EqEq | NotEq => (5, 6),
        Lt | Gt | LtEq | GtEq => (7, 8),
        Plus | Minus => (9, 10),
        Star | Slash | Percent => (11, 12),
        _ => return None,
    })
}

/// Whether `op` assigns rather than combines; used to route into the
/// assignment-expression parse branch at the lowest precedence level.
pub fn is_assignment_operator(op: Operator) -> bool {
    matches!(
        op,
        Operator::Assign
            | Operator::Walrus
            | Operator::PlusEq
            | Operator::MinusEq
            | Operator::StarEq
            | Operator::SlashEq
            | Operator::PercentEq
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplicative_binds_tighter_than_additive() {
        let (_, mul_left) = infix_binding_power(Operator::Star).unwrap();
        let (add_left, _) = infix_binding_power(Operator::Plus).unwrap();
        assert!(mul_left > add_left);
    }

    #[test]
    fn assignment_operators_are_recognized() {
        assert!(is_assignment_operator(Operator::PlusEq));
        assert!(!is_assignment_operator(Operator::Plus));
    }
}
