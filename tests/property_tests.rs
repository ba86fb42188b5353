//! Property-based tests for payment reconciliation primitives.
//!
//! These tests use proptest to verify invariants across a wide range of inputs,
//! helping to catch edge cases that unit tests might miss.

use std::collections::HashMap;

use axum::http::{HeaderMap, HeaderValue};
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;
use storefront_api::webhooks::{CartLine, CheckoutSession, SignatureVerifier};

fn session_with_cart(raw_cart: String) -> CheckoutSession {
    let mut metadata = HashMap::new();
    metadata.insert("cart".to_string(), raw_cart);
    CheckoutSession {
        id: "cs_prop".to_string(),
        customer_email: Some("buyer@example.com".to_string()),
        amount_total: None,
        currency: None,
        metadata,
    }
}

fn shipping_name_strategy() -> impl Strategy<Value = String> {
    // Case and whitespace variants of the sentinel name
    ("[ \t]{0,3}", prop::collection::vec(any::<bool>(), 8), "[ \t]{0,3}").prop_map(
        |(lead, caps, trail)| {
            let word: String = "shipping"
                .chars()
                .zip(caps)
                .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c })
                .collect();
            format!("{lead}{word}{trail}")
        },
    )
}

// Property: hostile cart metadata never breaks decoding
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn cart_decoding_never_panics(raw in ".*") {
        let session = session_with_cart(raw);
        let _ = session.decode_cart();
    }

    #[test]
    fn decoded_lines_have_positive_quantity_and_price(
        entries in prop::collection::vec(
            (
                any::<Option<i64>>(),
                "[a-zA-Z ]{0,12}",
                -1_000_000.0f64..1_000_000.0,
                any::<i64>(),
            ),
            0..8,
        )
    ) {
        let elements: Vec<serde_json::Value> = entries
            .iter()
            .map(|(id, name, price, quantity)| json!({
                "id": id,
                "name": name,
                "price": price,
                "quantity": quantity,
            }))
            .collect();
        let session = session_with_cart(serde_json::to_string(&elements).unwrap());

        let lines = session.decode_cart().expect("array input always decodes");
        for line in lines {
            prop_assert!(line.quantity >= 1, "quantity {} escaped validation", line.quantity);
            prop_assert!(line.price >= Decimal::ZERO, "negative price {} survived", line.price);
            prop_assert!(line.id.is_some() || line.name.is_some(), "line kept without identity");
        }
    }
}

// Property: the shipping pseudo-line is recognized in any casing
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn shipping_sentinel_matches_any_casing(name in shipping_name_strategy()) {
        let line = CartLine {
            id: None,
            name: Some(name.clone()),
            quantity: 1,
            price: Decimal::ZERO,
        };
        prop_assert!(line.is_shipping_sentinel(), "'{}' not treated as shipping", name);
    }

    #[test]
    fn sentinel_id_zero_matches_regardless_of_name(name in "[a-zA-Z ]{0,12}") {
        let line = CartLine {
            id: Some(0),
            name: if name.trim().is_empty() { None } else { Some(name) },
            quantity: 1,
            price: Decimal::ZERO,
        };
        prop_assert!(line.is_shipping_sentinel());
    }
}

// Property: line totals scale linearly with quantity
proptest! {
    #[test]
    fn line_total_is_price_times_quantity(
        cents in 0i64..100_000_000,
        quantity in 1i32..10_000,
    ) {
        let price = Decimal::new(cents, 2);
        let line = CartLine {
            id: Some(1),
            name: None,
            quantity,
            price,
        };
        prop_assert_eq!(line.line_total(), price * Decimal::from(quantity));
        prop_assert!(line.line_total() >= Decimal::ZERO);
    }
}

// Property: a signature verifies for the exact payload it signed, and for
// nothing else
proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn signatures_round_trip(
        secret in "[a-zA-Z0-9_]{1,40}",
        payload in prop::collection::vec(any::<u8>(), 0..512),
        timestamp in any::<i64>(),
    ) {
        let verifier = SignatureVerifier::new(secret, 0);
        let ts = timestamp.to_string();
        let signature = verifier.sign(&ts, &payload);

        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", HeaderValue::from_str(&ts).unwrap());
        headers.insert("x-signature", HeaderValue::from_str(&signature).unwrap());

        prop_assert!(verifier.verify(&headers, &payload).is_ok());
    }

    #[test]
    fn signatures_reject_altered_payloads(
        secret in "[a-zA-Z0-9_]{1,40}",
        payload in prop::collection::vec(any::<u8>(), 1..512),
        flip_index in any::<prop::sample::Index>(),
    ) {
        let verifier = SignatureVerifier::new(secret, 0);
        let ts = "1700000000";
        let signature = verifier.sign(ts, &payload);

        let mut altered = payload.clone();
        let index = flip_index.index(altered.len());
        altered[index] ^= 0xFF;

        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", HeaderValue::from_static("1700000000"));
        headers.insert("x-signature", HeaderValue::from_str(&signature).unwrap());

        prop_assert!(verifier.verify(&headers, &altered).is_err());
    }
}
