use std::borrow::Cow;

use crate::v8_helpers::{bytes_from_value, create_array_buffer_from_vec, throw_type_error};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Evaluates to a function that installs the classes around the natives it receives,
/// so the natives never appear on the global object.
const INSTALLER: &str = r#"
    (function (encodeUtf8, decodeUtf8) {
        class TextEncoder {
            get encoding() {
                return 'utf-8';
            }

            encode(input = '') {
                return encodeUtf8(String(input));
            }
        }

        class TextDecoder {
            #fatal;
            #ignoreBOM;

            constructor(label = 'utf-8', options = {}) {
                const encoding = String(label).trim().toLowerCase();
                if (encoding !== 'utf-8' && encoding !== 'utf8' && encoding !== 'unicode-1-1-utf-8') {
                    throw new RangeError(`The encoding label provided ('${label}') is invalid.`);
                }

                this.#fatal = Boolean(options && options.fatal);
                this.#ignoreBOM = Boolean(options && options.ignoreBOM);
            }

            get encoding() {
                return 'utf-8';
            }

            get fatal() {
                return this.#fatal;
            }

            get ignoreBOM() {
                return this.#ignoreBOM;
            }

            decode(input) {
                if (input === undefined) {
                    return '';
                }

                return decodeUtf8(input, this.#fatal, this.#ignoreBOM);
            }
        }

        globalThis.TextEncoder = TextEncoder;
        globalThis.TextDecoder = TextDecoder;
    })
"#;

fn encode_utf8(scope: &mut v8::PinScope, args: v8::FunctionCallbackArguments, mut retval: v8::ReturnValue) {
    // Lone surrogates become U+FFFD, as the encoding standard requires.
    let bytes = args.get(0).to_rust_string_lossy(scope).into_bytes();
    let len = bytes.len();
    let buffer = create_array_buffer_from_vec(scope, bytes);

    if let Some(array) = v8::Uint8Array::new(scope, buffer, 0, len) {
        retval.set(array.into());
    }
}

fn decode_utf8(scope: &mut v8::PinScope, args: v8::FunctionCallbackArguments, mut retval: v8::ReturnValue) {
    let Some(bytes) = bytes_from_value(scope, args.get(0)) else {
        throw_type_error(scope, "TextDecoder.decode: input must be an ArrayBuffer or typed array");
        return;
    };
    let fatal = args.get(1).boolean_value(scope);
    let ignore_bom = args.get(2).boolean_value(scope);

    let mut input = bytes.as_slice();
    if !ignore_bom {
        input = input.strip_prefix(UTF8_BOM).unwrap_or(input);
    }

    let text = if fatal {
        match std::str::from_utf8(input) {
            Ok(text) => Cow::Borrowed(text),
            Err(_) => {
                throw_type_error(scope, "The encoded data was not valid utf-8");
                return;
            }
        }
    } else {
        String::from_utf8_lossy(input)
    };

    if let Some(s) = v8::String::new(scope, &text) {
        retval.set(s.into());
    }
}

/// Install `TextEncoder` and `TextDecoder` (UTF-8 only) on the current global.
pub fn setup_text_encoding(scope: &mut v8::PinScope) -> Option<()> {
    let installer = exec_js!(scope, INSTALLER);
    let installer = v8::Local::<v8::Function>::try_from(installer).ok()?;

    let encode = v8::Function::new(scope, encode_utf8)?;
    let decode = v8::Function::new(scope, decode_utf8)?;
    let recv = v8::undefined(scope);

    installer.call(scope, recv.into(), &[encode.into(), decode.into()])?;
    Some(())
}
