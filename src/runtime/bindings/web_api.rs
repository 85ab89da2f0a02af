/// Install `btoa` / `atob` on the current global.
///
/// Both operate on binary strings (one character per byte), not UTF-8.
pub fn setup_base64(scope: &mut v8::PinScope) -> Option<()> {
    exec_js!(
        scope,
        r#"
        (function () {
            const ALPHABET = 'ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/';
            const LOOKUP = new Map();
            for (let i = 0; i < ALPHABET.length; i++) {
                LOOKUP.set(ALPHABET[i], i);
            }

            function invalidCharacter(message) {
                const error = new Error(message);
                error.name = 'InvalidCharacterError';
                return error;
            }

            globalThis.btoa = function btoa(data) {
                const input = String(data);
                let result = '';

                for (let i = 0; i < input.length; i += 3) {
                    const b1 = input.charCodeAt(i);
                    const b2 = i + 1 < input.length ? input.charCodeAt(i + 1) : 0;
                    const b3 = i + 2 < input.length ? input.charCodeAt(i + 2) : 0;

                    if (b1 > 0xFF || b2 > 0xFF || b3 > 0xFF) {
                        throw invalidCharacter('btoa: string contains characters outside of Latin1');
                    }

                    result += ALPHABET[b1 >> 2];
                    result += ALPHABET[((b1 & 3) << 4) | (b2 >> 4)];
                    result += i + 1 < input.length ? ALPHABET[((b2 & 15) << 2) | (b3 >> 6)] : '=';
                    result += i + 2 < input.length ? ALPHABET[b3 & 63] : '=';
                }

                return result;
            };

            globalThis.atob = function atob(data) {
                let input = String(data).replace(/[\t\n\f\r ]/g, '');

                if (input.length % 4 === 0) {
                    input = input.replace(/==?$/, '');
                }

                if (input.length % 4 === 1 || /[^A-Za-z0-9+/]/.test(input)) {
                    throw invalidCharacter('atob: the string to be decoded is not correctly encoded');
                }

                let result = '';
                let buffer = 0;
                let bits = 0;

                for (const ch of input) {
                    buffer = (buffer << 6) | LOOKUP.get(ch);
                    bits += 6;

                    if (bits >= 8) {
                        bits -= 8;
                        result += String.fromCharCode((buffer >> bits) & 0xFF);
                    }
                }

                return result;
            };
        })();
    "#
    );

    Some(())
}
