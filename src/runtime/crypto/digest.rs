use ring::digest;

use crate::v8_helpers::{bytes_from_value, create_array_buffer_from_vec};

fn algorithm_for(name: &str) -> Option<&'static digest::Algorithm> {
    match name.to_uppercase().as_str() {
        "SHA-1" => Some(&digest::SHA1_FOR_LEGACY_USE_ONLY),
        "SHA-256" => Some(&digest::SHA256),
        "SHA-384" => Some(&digest::SHA384),
        "SHA-512" => Some(&digest::SHA512),
        _ => None,
    }
}

/// `algorithm` is either a string or an object with a `name`.
fn algorithm_name(scope: &mut v8::PinScope, algorithm: v8::Local<v8::Value>) -> Option<String> {
    if algorithm.is_string() {
        return Some(algorithm.to_rust_string_lossy(scope));
    }

    if !algorithm.is_object() {
        return None;
    }

    let obj = algorithm.to_object(scope)?;
    let key = v8::String::new(scope, "name")?;
    let name = obj.get(scope, key.into())?;

    name.is_string().then(|| name.to_rust_string_lossy(scope))
}

/// `crypto.subtle.digest(algorithm, data)`: hashes synchronously and returns
/// an already settled promise.
pub(super) fn setup_digest(scope: &mut v8::PinScope, subtle_obj: v8::Local<v8::Object>) -> Option<()> {
    let digest_fn = v8::Function::new(
        scope,
        |scope: &mut v8::PinScope,
         args: v8::FunctionCallbackArguments,
         mut retval: v8::ReturnValue| {
            let Some(resolver) = v8::PromiseResolver::new(scope) else {
                return;
            };
            let promise = resolver.get_promise(scope);
            retval.set(promise.into());

            let result = match algorithm_name(scope, args.get(0)) {
                None => Err("digest: algorithm must be a string or { name }".to_string()),
                Some(name) => match algorithm_for(&name) {
                    None => Err(format!("digest: unsupported algorithm {}", name)),
                    Some(algorithm) => match bytes_from_value(scope, args.get(1)) {
                        None => Err("digest: data must be an ArrayBuffer or typed array".to_string()),
                        Some(data) => Ok(digest::digest(algorithm, &data).as_ref().to_vec()),
                    },
                },
            };

            match result {
                Ok(bytes) => {
                    let buffer = create_array_buffer_from_vec(scope, bytes);
                    resolver.resolve(scope, buffer.into());
                }
                Err(message) => {
                    if let Some(msg) = v8::String::new(scope, &message) {
                        let error = v8::Exception::type_error(scope, msg);
                        resolver.reject(scope, error);
                    }
                }
            }
        },
    )?;

    let key = v8::String::new(scope, "digest")?;
    subtle_obj.set(scope, key.into(), digest_fn.into())?;
    Some(())
}
