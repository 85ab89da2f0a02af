use ring::rand;

use crate::v8_helpers::{throw_error, throw_type_error};

/// Largest request `getRandomValues` accepts, as in Web Crypto.
const MAX_RANDOM_BYTES: usize = 65536;

pub(super) fn setup_get_random_values(
    scope: &mut v8::PinScope,
    crypto_obj: v8::Local<v8::Object>,
) -> Option<()> {
    let get_random_values_fn = v8::Function::new(
        scope,
        |scope: &mut v8::PinScope,
         args: v8::FunctionCallbackArguments,
         mut retval: v8::ReturnValue| {
            let array = args.get(0);

            let integer_array = array.is_typed_array()
                && !array.is_float32_array()
                && !array.is_float64_array();

            let view = match v8::Local::<v8::ArrayBufferView>::try_from(array) {
                Ok(view) if integer_array => view,
                _ => {
                    throw_type_error(scope, "getRandomValues: argument must be an integer typed array");
                    return;
                }
            };

            let len = view.byte_length();
            if len > MAX_RANDOM_BYTES {
                throw_error(
                    scope,
                    &format!(
                        "getRandomValues: {} bytes requested, at most {} allowed",
                        len, MAX_RANDOM_BYTES
                    ),
                );
                return;
            }

            if len > 0 {
                let mut bytes = vec![0u8; len];
                let rng = rand::SystemRandom::new();

                if rand::SecureRandom::fill(&rng, &mut bytes).is_err() {
                    throw_error(scope, "getRandomValues: random source failed");
                    return;
                }

                let Some(buffer) = view.buffer(scope) else {
                    return;
                };
                let backing_store = buffer.get_backing_store();
                let Some(data) = backing_store.data() else {
                    return;
                };
                let offset = view.byte_offset();

                // SAFETY: offset + len lies within the view, which lies within the backing store.
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        bytes.as_ptr(),
                        (data.as_ptr() as *mut u8).add(offset),
                        len,
                    );
                }
            }

            retval.set(array);
        },
    )?;

    let key = v8::String::new(scope, "getRandomValues")?;
    crypto_obj.set(scope, key.into(), get_random_values_fn.into())?;
    Some(())
}

pub(super) fn setup_random_uuid(scope: &mut v8::PinScope, crypto_obj: v8::Local<v8::Object>) -> Option<()> {
    let random_uuid_fn = v8::Function::new(
        scope,
        |scope: &mut v8::PinScope,
         _args: v8::FunctionCallbackArguments,
         mut retval: v8::ReturnValue| {
            let uuid = uuid::Uuid::new_v4().to_string();

            if let Some(uuid_str) = v8::String::new(scope, &uuid) {
                retval.set(uuid_str.into());
            }
        },
    )?;

    let key = v8::String::new(scope, "randomUUID")?;
    crypto_obj.set(scope, key.into(), random_uuid_fn.into())?;
    Some(())
}
