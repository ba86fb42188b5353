/// Inbound payment gateway webhook plumbing: signature verification and
/// payload decoding. Everything here is pure; persistence happens in the
/// reconciliation service.
pub mod event;
pub mod signature;

pub use event::{CartDecodeError, CartLine, CheckoutSession, PaymentEvent, CHECKOUT_COMPLETED};
pub use signature::SignatureVerifier;
