#![allow(clippy::missing_safety_doc)]

#[macro_use]
extern crate log;

use std::cell::RefCell;
use std::sync::Arc;

use jni::objects::{GlobalRef, JClass, JObject, JValue};
use jni::sys::{jboolean, jbyte, jbyteArray, jint, jlong, jobject, jstring, JNI_FALSE, JNI_TRUE};
use jni::{JNIEnv, JavaVM};

use secure_element::{ErrorKind, SecureElement, StateChangeCallback, Transport, TransportError};

const NULL: jobject = 0 as jobject;

const STATUS_OK: jint = 0;
const STATUS_FAILED: jint = 1;
const STATUS_CHANNEL_NOT_AVAILABLE: jint = 2;
const STATUS_IOERROR: jint = 5;
const STATUS_NULL_POINTER: jint = -4;
const STATUS_ILLEGAL_STATE: jint = -5;

thread_local! {
    static LAST_ERROR: RefCell<Option<(jint, String)>> = RefCell::new(None);
}

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error("Secure Element Error: {0}")]
    SecureElement(#[from] secure_element::Error),

    #[error("JNI Error: {0}")]
    Jni(#[from] jni::errors::Error),

    #[error("{0} must not be null")]
    NullPointer(&'static str),
}

impl Error {
    fn status(&self) -> jint {
        match self {
            Self::SecureElement(e) => match e.kind() {
                ErrorKind::NullCallback => STATUS_NULL_POINTER,
                ErrorKind::NotInitialized => STATUS_ILLEGAL_STATE,
                ErrorKind::IoError => STATUS_IOERROR,
                ErrorKind::Failed => STATUS_FAILED,
                ErrorKind::NoChannelAvailable => STATUS_CHANNEL_NOT_AVAILABLE,
            },
            Self::Jni(_) => STATUS_FAILED,
            Self::NullPointer(_) => STATUS_NULL_POINTER,
        }
    }
}

/// Reaches the secure element through a Java object implementing
/// `boolean connect()`, `boolean isConnected()` and `byte[] sendReceive(byte[])`.
struct JniTransport {
    vm: JavaVM,
    delegate: GlobalRef,
}

impl JniTransport {
    fn call_bool(&self, name: &str) -> Result<bool, jni::errors::Error> {
        let env = self.vm.attach_current_thread()?;

        env.call_method(self.delegate.as_obj(), name, "()Z", &[])?.z()
    }
}

fn transport_error(e: jni::errors::Error) -> TransportError {
    error!("Transport Error: {:?}", e);
    TransportError::other(e.to_string())
}

impl Transport for JniTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        match self.call_bool("connect").map_err(transport_error)? {
            true => Ok(()),
            _ => Err(TransportError::other("connect returned false")),
        }
    }

    fn is_connected(&self) -> bool {
        self.call_bool("isConnected").unwrap_or_else(|e| {
            error!("isConnected Error: {:?}", e);
            false
        })
    }

    fn send_receive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        let env = self.vm.attach_current_thread().map_err(transport_error)?;
        let command = env
            .byte_array_from_slice(command)
            .map_err(transport_error)?;

        let arg_val = JValue::Object(unsafe { JObject::from_raw(command) });
        let response = env
            .call_method(self.delegate.as_obj(), "sendReceive", "([B)[B", &[arg_val])
            .and_then(|v| v.l())
            .map_err(transport_error)?;

        if response.is_null() {
            return Err(TransportError::Disconnected);
        }

        env.convert_byte_array(response.into_raw())
            .map_err(transport_error)
    }
}

/// Forwards state changes to a Java object implementing `void onStateChange(boolean, String)`.
struct JniCallback {
    vm: JavaVM,
    delegate: GlobalRef,
}

impl StateChangeCallback for JniCallback {
    fn on_state_change(&self, connected: bool, reason: &str) {
        let res = self.vm.attach_current_thread().and_then(|env| {
            let reason = env.new_string(reason)?;
            let connected = if connected { JNI_TRUE } else { JNI_FALSE };

            env.call_method(
                self.delegate.as_obj(),
                "onStateChange",
                "(ZLjava/lang/String;)V",
                &[JValue::Bool(connected), JValue::Object(JObject::from(reason))],
            )
        });

        if let Err(e) = res {
            error!("onStateChange Error: {:?}", e);
        }
    }
}

type Engine = SecureElement<JniTransport>;

// If result is an error, sets the status and message to LAST_ERROR.
// Clears the last error otherwise.
fn record<T>(result: &Result<T, Error>) {
    LAST_ERROR.with(|last| {
        *last.borrow_mut() = result.as_ref().err().map(|e| (e.status(), e.to_string()));
    });
}

fn wrap<T>(default: T, inner: impl FnOnce() -> Result<T, Error>) -> T {
    let result = inner();
    record(&result);

    result.unwrap_or(default)
}

fn status(inner: impl FnOnce() -> Result<(), Error>) -> jint {
    let result = inner();
    record(&result);

    result.err().map_or(STATUS_OK, |e| e.status())
}

unsafe fn engine<'a>(engine: jlong) -> Result<&'a Engine, Error> {
    (engine as *const Engine)
        .as_ref()
        .ok_or(Error::NullPointer("engine"))
}

fn byte_array(env: JNIEnv, array: jbyteArray, name: &'static str) -> Result<Vec<u8>, Error> {
    if array.is_null() {
        return Err(Error::NullPointer(name));
    }

    Ok(env.convert_byte_array(array)?)
}

#[no_mangle]
pub extern "C" fn Java_org_secureelement_ffi_LibSecureElement_init() {
    #[cfg(target_os = "android")]
    android_log::init("SecureElement.FFI").ok();
}

/// Returns the message of the latest error occurred on this thread, or null.
#[no_mangle]
pub extern "C" fn Java_org_secureelement_ffi_LibSecureElement_lastError(
    env: JNIEnv,
    _class: JClass,
) -> jstring {
    match LAST_ERROR.with(|last| last.borrow().clone()) {
        Some((_, message)) => env
            .new_string(message)
            .map_or(0 as jstring, |s| s.into_raw()),
        None => 0 as jstring,
    }
}

/// Returns the status code of the latest error occurred on this thread, or 0.
#[no_mangle]
pub extern "C" fn Java_org_secureelement_ffi_LibSecureElement_lastStatus(
    _env: JNIEnv,
    _class: JClass,
) -> jint {
    LAST_ERROR.with(|last| last.borrow().as_ref().map_or(STATUS_OK, |(status, _)| *status))
}

#[no_mangle]
pub extern "C" fn Java_org_secureelement_ffi_LibSecureElement_newEngine(
    env: JNIEnv,
    _class: JClass,
    transport: JObject,
) -> jlong {
    wrap(0, || {
        if transport.is_null() {
            return Err(Error::NullPointer("transport"));
        }

        let transport = JniTransport {
            vm: env.get_java_vm()?,
            delegate: env.new_global_ref(transport)?,
        };

        Ok(Box::into_raw(Box::new(SecureElement::new(transport))) as jlong)
    })
}

#[no_mangle]
pub unsafe extern "C" fn Java_org_secureelement_ffi_LibSecureElement_close(
    _env: JNIEnv,
    _class: JClass,
    engine: jlong,
) {
    if engine != 0 {
        let _ = Box::from_raw(engine as *mut Engine);
    }
}

#[no_mangle]
pub unsafe extern "C" fn Java_org_secureelement_ffi_LibSecureElement_initEngine(
    env: JNIEnv,
    _class: JClass,
    engine: jlong,
    callback: JObject,
) -> jint {
    status(|| {
        let engine = self::engine(engine)?;
        let callback = match callback.is_null() {
            true => None,
            _ => Some(Arc::new(JniCallback {
                vm: env.get_java_vm()?,
                delegate: env.new_global_ref(callback)?,
            }) as Arc<dyn StateChangeCallback>),
        };

        Ok(engine.init(callback)?)
    })
}

#[no_mangle]
pub unsafe extern "C" fn Java_org_secureelement_ffi_LibSecureElement_getAtr(
    env: JNIEnv,
    _class: JClass,
    engine: jlong,
) -> jbyteArray {
    wrap(NULL, || {
        let atr = self::engine(engine)?.get_atr()?;

        Ok(env.byte_array_from_slice(&atr)?)
    })
}

#[no_mangle]
pub unsafe extern "C" fn Java_org_secureelement_ffi_LibSecureElement_isCardPresent(
    _env: JNIEnv,
    _class: JClass,
    engine: jlong,
) -> jboolean {
    wrap(JNI_FALSE, || {
        match self::engine(engine)?.is_card_present()? {
            true => Ok(JNI_TRUE),
            _ => Ok(JNI_FALSE),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn Java_org_secureelement_ffi_LibSecureElement_reset(
    _env: JNIEnv,
    _class: JClass,
    engine: jlong,
) -> jint {
    status(|| Ok(self::engine(engine)?.reset()?))
}

#[no_mangle]
pub unsafe extern "C" fn Java_org_secureelement_ffi_LibSecureElement_transmit(
    env: JNIEnv,
    _class: JClass,
    engine: jlong,
    command: jbyteArray,
) -> jbyteArray {
    wrap(NULL, || {
        let engine = self::engine(engine)?;
        let command = byte_array(env, command, "command")?;
        let response = engine.transmit(&command)?;

        Ok(env.byte_array_from_slice(&response)?)
    })
}

#[no_mangle]
pub unsafe extern "C" fn Java_org_secureelement_ffi_LibSecureElement_openBasicChannel(
    env: JNIEnv,
    _class: JClass,
    engine: jlong,
    aid: jbyteArray,
    p2: jbyte,
) -> jbyteArray {
    wrap(NULL, || {
        let engine = self::engine(engine)?;
        let aid = byte_array(env, aid, "aid")?;
        let response = engine.open_basic_channel(&aid, p2 as u8)?;

        Ok(env.byte_array_from_slice(&response)?)
    })
}

/// Returns the channel number followed by the SELECT response.
#[no_mangle]
pub unsafe extern "C" fn Java_org_secureelement_ffi_LibSecureElement_openLogicalChannel(
    env: JNIEnv,
    _class: JClass,
    engine: jlong,
    aid: jbyteArray,
    p2: jbyte,
) -> jbyteArray {
    wrap(NULL, || {
        let engine = self::engine(engine)?;
        let aid = byte_array(env, aid, "aid")?;
        let response = engine.open_logical_channel(&aid, p2 as u8)?;

        let mut bytes = Vec::with_capacity(response.select_response.len() + 1);
        bytes.push(response.channel_number);
        bytes.extend_from_slice(&response.select_response);

        Ok(env.byte_array_from_slice(&bytes)?)
    })
}

#[no_mangle]
pub unsafe extern "C" fn Java_org_secureelement_ffi_LibSecureElement_closeChannel(
    _env: JNIEnv,
    _class: JClass,
    engine: jlong,
    channel: jbyte,
) -> jint {
    status(|| Ok(self::engine(engine)?.close_channel(channel as u8)?))
}
