//! The sandbox's cryptographic provider.
//!
//! Only the non-key parts of Web Crypto: random values, UUIDs and digests.

mod digest;
mod random;

use crate::v8_helpers::set_property;

/// Build the `crypto` object (`getRandomValues`, `randomUUID`, `subtle.digest`).
pub fn create_crypto<'s>(scope: &mut v8::PinScope<'s, '_>) -> Option<v8::Local<'s, v8::Object>> {
    let crypto_obj = v8::Object::new(scope);
    let subtle_obj = v8::Object::new(scope);
    set_property(scope, crypto_obj, "subtle", subtle_obj.into())?;

    random::setup_get_random_values(scope, crypto_obj)?;
    random::setup_random_uuid(scope, crypto_obj)?;
    digest::setup_digest(scope, subtle_obj)?;

    Some(crypto_obj)
}
