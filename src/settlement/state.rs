use crate::domain::payment::PaymentStatus;

/// What a settlement attempt should do given the payment's current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionAction {
    /// Apply the completion cascade: confirm registrations, generate tickets.
    Apply,
    /// Someone already completed it; callers treat this as success and do nothing.
    AlreadyCompleted,
    /// Terminal non-completed state; completing from here is illegal.
    Reject,
}

pub fn completion_action(status: PaymentStatus) -> CompletionAction {
    match status {
        PaymentStatus::Pending | PaymentStatus::Processing => CompletionAction::Apply,
        PaymentStatus::Completed => CompletionAction::AlreadyCompleted,
        PaymentStatus::Failed
        | PaymentStatus::Cancelled
        | PaymentStatus::Refunded
        | PaymentStatus::PartiallyRefunded => CompletionAction::Reject,
    }
}

/// Full legality table for the payment lifecycle. Everything not listed here
/// is an invalid transition.
pub fn can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    use PaymentStatus::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Pending, Completed)
            | (Pending, Failed)
            | (Pending, Cancelled)
            | (Processing, Completed)
            | (Processing, Failed)
            | (Processing, Cancelled)
            | (Completed, Refunded)
            | (Completed, PartiallyRefunded)
            | (PartiallyRefunded, Refunded)
    )
}

/// Post-refund payment status for a refund of `requested` cents, given the
/// payment total and the amount already settled by earlier refunds. `None`
/// means the request violates the refund bound.
pub fn refund_target(amount_cents: i64, settled_cents: i64, requested: i64) -> Option<PaymentStatus> {
    if requested <= 0 {
        return None;
    }
    if settled_cents + requested > amount_cents {
        return None;
    }
    if settled_cents + requested == amount_cents {
        Some(PaymentStatus::Refunded)
    } else {
        Some(PaymentStatus::PartiallyRefunded)
    }
}

/// A payment accepts refunds only once settled funds exist against it.
pub fn refundable(status: PaymentStatus) -> bool {
    matches!(status, PaymentStatus::Completed | PaymentStatus::PartiallyRefunded)
}
