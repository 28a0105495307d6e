use event_payments::domain::payment::Registration;
use event_payments::error::PaymentError;
use event_payments::service::ledger::{
    generate_reference, platform_fee, validate_registration_set,
};
use uuid::Uuid;

fn registration(event_id: Uuid) -> Registration {
    Registration {
        id: Uuid::new_v4(),
        event_id,
        status: "PENDING".to_string(),
    }
}

#[test]
fn accepts_a_clean_registration_set() {
    let event_id = Uuid::new_v4();
    let regs = vec![registration(event_id), registration(event_id)];
    let ids: Vec<Uuid> = regs.iter().map(|r| r.id).collect();

    assert!(validate_registration_set(event_id, &ids, &regs, &[]).is_ok());
}

#[test]
fn rejects_unknown_registrations() {
    let event_id = Uuid::new_v4();
    let known = registration(event_id);
    let missing = Uuid::new_v4();

    let err = validate_registration_set(event_id, &[known.id, missing], &[known], &[]).unwrap_err();
    match err {
        PaymentError::InvalidRegistrationSet(msg) => {
            assert!(msg.contains(&missing.to_string()), "message names the offender: {msg}")
        }
        other => panic!("expected InvalidRegistrationSet, got {other:?}"),
    }
}

#[test]
fn rejects_registrations_from_another_event() {
    let event_id = Uuid::new_v4();
    let foreign = registration(Uuid::new_v4());
    let ids = vec![foreign.id];

    let err = validate_registration_set(event_id, &ids, &[foreign.clone()], &[]).unwrap_err();
    match err {
        PaymentError::InvalidRegistrationSet(msg) => {
            assert!(msg.contains("different event"));
            assert!(msg.contains(&foreign.id.to_string()));
        }
        other => panic!("expected InvalidRegistrationSet, got {other:?}"),
    }
}

#[test]
fn rejects_cancelled_registrations() {
    let event_id = Uuid::new_v4();
    let mut reg = registration(event_id);
    reg.status = "CANCELLED".to_string();
    let ids = vec![reg.id];

    let err = validate_registration_set(event_id, &ids, &[reg], &[]).unwrap_err();
    assert!(matches!(err, PaymentError::InvalidRegistrationSet(_)));
}

#[test]
fn rejects_already_paid_registrations() {
    let event_id = Uuid::new_v4();
    let reg = registration(event_id);
    let ids = vec![reg.id];

    let err = validate_registration_set(event_id, &ids, &[reg.clone()], &[reg.id]).unwrap_err();
    match err {
        PaymentError::InvalidRegistrationSet(msg) => assert!(msg.contains("already paid")),
        other => panic!("expected InvalidRegistrationSet, got {other:?}"),
    }
}

#[test]
fn platform_fee_uses_basis_points() {
    assert_eq!(platform_fee(2000, 250), 50);
    assert_eq!(platform_fee(2000, 0), 0);
    // Integer cents throughout; sub-cent remainders truncate.
    assert_eq!(platform_fee(999, 100), 9);
}

#[test]
fn references_carry_prefix_and_unambiguous_token() {
    let reference = generate_reference("PAY");
    let (prefix, token) = reference.split_once('-').expect("prefix-token shape");
    assert_eq!(prefix, "PAY");
    assert_eq!(token.len(), 12);
    assert!(token
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    assert!(!token.contains(['0', 'O', '1', 'I']));
}

#[test]
fn consecutive_references_differ() {
    let a = generate_reference("PAY");
    let b = generate_reference("PAY");
    assert_ne!(a, b);
}
