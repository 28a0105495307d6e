use event_payments::domain::payment::PaymentStatus;
use event_payments::settlement::state::{
    can_transition, completion_action, refund_target, refundable, CompletionAction,
};

#[test]
fn pending_and_processing_payments_can_complete() {
    assert_eq!(completion_action(PaymentStatus::Pending), CompletionAction::Apply);
    assert_eq!(completion_action(PaymentStatus::Processing), CompletionAction::Apply);
}

#[test]
fn completed_payment_is_a_no_op_not_an_error() {
    assert_eq!(
        completion_action(PaymentStatus::Completed),
        CompletionAction::AlreadyCompleted
    );
}

#[test]
fn terminal_states_reject_completion() {
    for status in [
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
        PaymentStatus::Refunded,
        PaymentStatus::PartiallyRefunded,
    ] {
        assert_eq!(completion_action(status), CompletionAction::Reject);
    }
}

#[test]
fn lifecycle_transitions_match_the_legality_table() {
    use PaymentStatus::*;

    assert!(can_transition(Pending, Processing));
    assert!(can_transition(Processing, Completed));
    assert!(can_transition(Processing, Failed));
    assert!(can_transition(Processing, Cancelled));
    assert!(can_transition(Completed, Refunded));
    assert!(can_transition(Completed, PartiallyRefunded));
    assert!(can_transition(PartiallyRefunded, Refunded));

    // No resurrection, no skipping backwards.
    assert!(!can_transition(Failed, Processing));
    assert!(!can_transition(Failed, Completed));
    assert!(!can_transition(Cancelled, Completed));
    assert!(!can_transition(Refunded, Completed));
    assert!(!can_transition(Completed, Pending));
    assert!(!can_transition(Completed, Failed));
    assert!(!can_transition(Refunded, PartiallyRefunded));
}

#[test]
fn partial_refund_leaves_payment_partially_refunded() {
    assert_eq!(refund_target(2000, 0, 500), Some(PaymentStatus::PartiallyRefunded));
}

#[test]
fn exhausting_the_balance_marks_payment_refunded() {
    assert_eq!(refund_target(2000, 0, 2000), Some(PaymentStatus::Refunded));
    assert_eq!(refund_target(2000, 500, 1500), Some(PaymentStatus::Refunded));
}

#[test]
fn refunds_beyond_the_payment_amount_are_rejected() {
    // 500 already refunded, 1600 more would exceed the 2000 total.
    assert_eq!(refund_target(2000, 500, 1600), None);
    assert_eq!(refund_target(2000, 0, 2001), None);
}

#[test]
fn non_positive_refund_amounts_are_rejected() {
    assert_eq!(refund_target(2000, 0, 0), None);
    assert_eq!(refund_target(2000, 0, -100), None);
}

#[test]
fn only_settled_payments_accept_refunds() {
    assert!(refundable(PaymentStatus::Completed));
    assert!(refundable(PaymentStatus::PartiallyRefunded));
    for status in [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
        PaymentStatus::Refunded,
    ] {
        assert!(!refundable(status), "{status:?} should not accept refunds");
    }
}
