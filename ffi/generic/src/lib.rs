#![allow(clippy::missing_safety_doc)]

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CString};
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::null_mut;
use std::slice;
use std::sync::Arc;

use secure_element::{
    Error, ErrorKind, SecureElement, StateChangeCallback, Transport, TransportError,
};

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = RefCell::new(None);
}

fn set_last_error(error: Option<String>) {
    LAST_ERROR.with(|last| *last.borrow_mut() = error);
}

/// Status codes returned by every operation, compatible with the secure element HAL.
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    Failed = 1,
    ChannelNotAvailable = 2,
    IoError = 5,
    NullPointer = -4,
    IllegalState = -5,
}

impl From<&Error> for Status {
    fn from(error: &Error) -> Self {
        match error.kind() {
            ErrorKind::NullCallback => Self::NullPointer,
            ErrorKind::NotInitialized => Self::IllegalState,
            ErrorKind::IoError => Self::IoError,
            ErrorKind::Failed => Self::Failed,
            ErrorKind::NoChannelAvailable => Self::ChannelNotAvailable,
        }
    }
}

fn status<T>(result: Result<T, Error>, write: impl FnOnce(T)) -> Status {
    // If result is an error, sets the message to LAST_ERROR.
    // Clears the last error otherwise.
    set_last_error(result.as_ref().err().map(|e| e.to_string()));

    match result {
        Ok(value) => {
            write(value);
            Status::Ok
        }
        Err(e) => Status::from(&e),
    }
}

fn null_pointer(name: &str) -> Status {
    set_last_error(Some(format!("{name} must not be null")));
    Status::NullPointer
}

/// A struct represents a byte array.
/// Dependents can read it from ptr to ptr+len, and should ignore about cap.
/// ptr can be null pointer, so dependents must check the ptr is not null.
/// Arrays returned from this library must be released with se_byte_array_free.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct ByteArray {
    ptr: *mut u8,
    len: usize,
    cap: usize,
}

impl Default for ByteArray {
    fn default() -> Self {
        Self {
            ptr: null_mut(),
            len: 0,
            cap: 0,
        }
    }
}

impl From<Vec<u8>> for ByteArray {
    fn from(bytes: Vec<u8>) -> Self {
        let mut bytes = ManuallyDrop::new(bytes);
        Self {
            ptr: bytes.as_mut_ptr(),
            len: bytes.len(),
            cap: bytes.capacity(),
        }
    }
}

impl ByteArray {
    /// Takes the ownership back from the foreign side.
    /// The array must have been created by this library.
    unsafe fn into_vec(self) -> Option<Vec<u8>> {
        let Self { ptr, len, cap } = self;
        match ptr.is_null() {
            true => None,
            _ => Some(Vec::from_raw_parts(ptr, len, cap)),
        }
    }
}

unsafe fn bytes<'a>(ptr: *const u8, len: usize) -> Option<&'a [u8]> {
    match (ptr.is_null(), len) {
        (_, 0) => Some(&[]),
        (true, _) => None,
        _ => Some(slice::from_raw_parts(ptr, len)),
    }
}

/// Function pointers through which the engine reaches the secure element.
/// ctx is passed back as the first argument on every call.
/// The functions may be called from any thread the engine is used on.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct TransportVTable {
    pub ctx: *mut c_void,

    /// Connects to the secure element, returning false on failure.
    pub connect: extern "C" fn(ctx: *mut c_void) -> bool,

    /// Returns whether the link is up.
    pub is_connected: extern "C" fn(ctx: *mut c_void) -> bool,

    /// Sends the command and returns the response, created with se_byte_array_new.
    /// Returns an array with a null ptr on failure.
    pub send_receive: extern "C" fn(ctx: *mut c_void, command: ByteArray) -> ByteArray,
}

pub struct FfiTransport {
    vtable: TransportVTable,
}

// The foreign side guarantees the context can be used from any thread.
unsafe impl Send for FfiTransport {}

impl Transport for FfiTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        match (self.vtable.connect)(self.vtable.ctx) {
            true => Ok(()),
            _ => Err(TransportError::other("Foreign transport refused to connect")),
        }
    }

    fn is_connected(&self) -> bool {
        (self.vtable.is_connected)(self.vtable.ctx)
    }

    fn send_receive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransportError> {
        let command = ByteArray::from(command.to_vec());
        let response = (self.vtable.send_receive)(self.vtable.ctx, command);

        // The command is borrowed by the foreign side only for the duration of the call.
        drop(unsafe { command.into_vec() });

        unsafe { response.into_vec() }
            .ok_or_else(|| TransportError::other("Foreign transport returned no response"))
    }
}

pub type StateChangeFn = extern "C" fn(ctx: *mut c_void, connected: bool, reason: *const c_char);

struct FfiCallback {
    delegate: StateChangeFn,
    ctx: *mut c_void,
}

unsafe impl Send for FfiCallback {}
unsafe impl Sync for FfiCallback {}

impl StateChangeCallback for FfiCallback {
    fn on_state_change(&self, connected: bool, reason: &str) {
        let reason = CString::new(reason).unwrap_or_default();
        (self.delegate)(self.ctx, connected, reason.as_ptr());
    }
}

/// Opaque handle of an engine.
pub struct Engine(SecureElement<FfiTransport>);

impl Deref for Engine {
    type Target = SecureElement<FfiTransport>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Returns the latest error occurred on this thread before calling this function.
/// If no error occurred before or failed to get the error, returns null pointer.
/// The string must be released with se_string_free.
#[no_mangle]
pub extern "C" fn se_last_error() -> *mut c_char {
    match LAST_ERROR
        .with(|last| last.borrow().clone())
        .and_then(|e| CString::new(e).ok())
    {
        Some(str) => str.into_raw(),
        None => null_mut(),
    }
}

/// Releases a string returned from this library.
#[no_mangle]
pub unsafe extern "C" fn se_string_free(str: *mut c_char) {
    if !str.is_null() {
        let _ = CString::from_raw(str);
    }
}

/// Copies the bytes into an array owned by this library.
/// Transports must create their responses with this function.
#[no_mangle]
pub unsafe extern "C" fn se_byte_array_new(ptr: *const u8, len: usize) -> ByteArray {
    match bytes(ptr, len) {
        Some(bytes) => bytes.to_vec().into(),
        None => ByteArray::default(),
    }
}

/// Releases a byte array returned from this library.
#[no_mangle]
pub unsafe extern "C" fn se_byte_array_free(array: ByteArray) {
    drop(array.into_vec());
}

/// Creates a new engine communicating through the transport.
/// The engine refuses to operate until se_init is called.
#[no_mangle]
pub extern "C" fn se_new(transport: TransportVTable) -> *mut Engine {
    let engine = Engine(SecureElement::new(FfiTransport { vtable: transport }));

    Box::into_raw(Box::new(engine))
}

/// Closes the engine.
#[no_mangle]
pub unsafe extern "C" fn se_free(engine: *mut Engine) {
    if !engine.is_null() {
        let _ = Box::from_raw(engine);
    }
}

/// Registers the state change callback and notifies it the secure element is up.
#[no_mangle]
pub unsafe extern "C" fn se_init(
    engine: *const Engine,
    callback: Option<StateChangeFn>,
    ctx: *mut c_void,
) -> Status {
    let Some(engine) = engine.as_ref() else {
        return null_pointer("engine");
    };

    let callback = callback.map(|delegate| {
        Arc::new(FfiCallback { delegate, ctx }) as Arc<dyn StateChangeCallback>
    });

    status(engine.init(callback), |_| ())
}

/// Gets the Answer To Reset into atr.
#[no_mangle]
pub unsafe extern "C" fn se_get_atr(engine: *const Engine, atr: *mut ByteArray) -> Status {
    let (Some(engine), false) = (engine.as_ref(), atr.is_null()) else {
        return null_pointer("engine and atr");
    };

    status(engine.get_atr(), |v| *atr = v.into())
}

/// Writes whether the secure element is present into present.
#[no_mangle]
pub unsafe extern "C" fn se_is_card_present(engine: *const Engine, present: *mut bool) -> Status {
    let (Some(engine), false) = (engine.as_ref(), present.is_null()) else {
        return null_pointer("engine and present");
    };

    status(engine.is_card_present(), |v| *present = v)
}

/// Forgets every logical channel and notifies the callback.
#[no_mangle]
pub unsafe extern "C" fn se_reset(engine: *const Engine) -> Status {
    let Some(engine) = engine.as_ref() else {
        return null_pointer("engine");
    };

    status(engine.reset(), |_| ())
}

/// Transmits the command as-is, writing the raw response into response.
#[no_mangle]
pub unsafe extern "C" fn se_transmit(
    engine: *const Engine,
    command: *const u8,
    command_len: usize,
    response: *mut ByteArray,
) -> Status {
    let (Some(engine), Some(command), false) = (
        engine.as_ref(),
        bytes(command, command_len),
        response.is_null(),
    ) else {
        return null_pointer("engine, command and response");
    };

    status(engine.transmit(command), |v| *response = v.into())
}

/// Selects the application on the basic channel, writing the SELECT response into response.
#[no_mangle]
pub unsafe extern "C" fn se_open_basic_channel(
    engine: *const Engine,
    aid: *const u8,
    aid_len: usize,
    p2: u8,
    response: *mut ByteArray,
) -> Status {
    let (Some(engine), Some(aid), false) =
        (engine.as_ref(), bytes(aid, aid_len), response.is_null())
    else {
        return null_pointer("engine, aid and response");
    };

    status(engine.open_basic_channel(aid, p2), |v| *response = v.into())
}

/// Opens a logical channel and selects the application on it.
/// Writes the channel number into channel and the SELECT response into response.
#[no_mangle]
pub unsafe extern "C" fn se_open_logical_channel(
    engine: *const Engine,
    aid: *const u8,
    aid_len: usize,
    p2: u8,
    channel: *mut u8,
    response: *mut ByteArray,
) -> Status {
    let (Some(engine), Some(aid), false, false) = (
        engine.as_ref(),
        bytes(aid, aid_len),
        channel.is_null(),
        response.is_null(),
    ) else {
        return null_pointer("engine, aid, channel and response");
    };

    status(engine.open_logical_channel(aid, p2), |v| {
        *channel = v.channel_number;
        *response = v.select_response.into();
    })
}

/// Closes the logical channel.
#[no_mangle]
pub unsafe extern "C" fn se_close_channel(engine: *const Engine, channel: u8) -> Status {
    let Some(engine) = engine.as_ref() else {
        return null_pointer("engine");
    };

    status(engine.close_channel(channel), |_| ())
}
