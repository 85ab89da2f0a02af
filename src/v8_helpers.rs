//! Small V8 helpers shared by the bindings.

/// Creates a V8 ArrayBuffer from a Vec<u8> without copying.
pub fn create_array_buffer_from_vec<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    data: Vec<u8>,
) -> v8::Local<'s, v8::ArrayBuffer> {
    if data.is_empty() {
        return v8::ArrayBuffer::new(scope, 0);
    }

    let backing_store = v8::ArrayBuffer::new_backing_store_from_vec(data).make_shared();
    v8::ArrayBuffer::with_backing_store(scope, &backing_store)
}

/// Copy the bytes of an ArrayBuffer or ArrayBufferView (typed array, DataView).
///
/// Returns `None` for any other value.
pub fn bytes_from_value(
    scope: &mut v8::PinScope,
    value: v8::Local<v8::Value>,
) -> Option<Vec<u8>> {
    let view = if let Ok(view) = v8::Local::<v8::ArrayBufferView>::try_from(value) {
        view
    } else if let Ok(buffer) = v8::Local::<v8::ArrayBuffer>::try_from(value) {
        let len = buffer.byte_length();
        v8::Uint8Array::new(scope, buffer, 0, len)?.into()
    } else {
        return None;
    };

    let mut bytes = vec![0u8; view.byte_length()];
    view.copy_contents(&mut bytes);
    Some(bytes)
}

/// Set `obj[name] = value`.
pub fn set_property(
    scope: &mut v8::PinScope,
    obj: v8::Local<v8::Object>,
    name: &str,
    value: v8::Local<v8::Value>,
) -> Option<()> {
    let key = v8::String::new(scope, name)?;
    obj.set(scope, key.into(), value)?;
    Some(())
}

/// Throw an `Error` created in the current context.
pub fn throw_error(scope: &mut v8::PinScope, message: &str) {
    if let Some(msg) = v8::String::new(scope, message) {
        let exception = v8::Exception::error(scope, msg);
        scope.throw_exception(exception);
    }
}

pub fn throw_type_error(scope: &mut v8::PinScope, message: &str) {
    if let Some(msg) = v8::String::new(scope, message) {
        let exception = v8::Exception::type_error(scope, msg);
        scope.throw_exception(exception);
    }
}

pub fn throw_range_error(scope: &mut v8::PinScope, message: &str) {
    if let Some(msg) = v8::String::new(scope, message) {
        let exception = v8::Exception::range_error(scope, msg);
        scope.throw_exception(exception);
    }
}
