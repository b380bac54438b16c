//! FFI bindings for Synheart Focus
//!
//! This module provides C-compatible functions for driving a [`BioEngine`] from
//! other languages. Inputs and outputs are JSON in null-terminated C strings.
//! Returned strings are allocated and must be freed by the caller using
//! `focus_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::engine::BioEngine;
use crate::types::UpdateInput;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Serialize a value into a newly allocated C string, NULL on failure
fn json_to_cstr<T: Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

#[derive(Serialize)]
struct StatusPayload {
    code: String,
    message: String,
}

// ============================================================================
// Engine Lifecycle
// ============================================================================

/// Opaque handle to a BioEngine
pub struct FocusEngineHandle {
    engine: BioEngine,
}

/// Create a new engine driven by the system clock.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string, or NULL for defaults.
/// - `readiness` and `sleep_score` are clamped to 0-100.
/// - Returns a pointer that must be freed with `focus_engine_free`.
/// - Returns NULL on error; call `focus_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn focus_engine_new(
    config_json: *const c_char,
    readiness: i32,
    sleep_score: i32,
) -> *mut FocusEngineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        EngineConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match EngineConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match BioEngine::builder()
        .readiness(readiness)
        .sleep_score(sleep_score)
        .config(config)
        .build()
    {
        Ok(engine) => Box::into_raw(Box::new(FocusEngineHandle { engine })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `focus_engine_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn focus_engine_free(engine: *mut FocusEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

// ============================================================================
// Engine API
// ============================================================================

/// Advance the engine with one update input and return the new state as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `focus_engine_new`.
/// - `input_json` must be a valid null-terminated C string holding an update input.
/// - Returns a newly allocated string that must be freed with `focus_free_string`.
/// - Returns NULL on error; call `focus_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn focus_engine_update(
    engine: *mut FocusEngineHandle,
    input_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &mut *engine;

    let json = match cstr_to_string(input_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid input string pointer");
            return ptr::null_mut();
        }
    };

    let input: UpdateInput = match serde_json::from_str(&json) {
        Ok(input) => input,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let state = handle.engine.update(input);
    json_to_cstr(&state)
}

/// Latest engine state as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `focus_engine_new`.
/// - Returns a newly allocated string that must be freed with `focus_free_string`.
/// - Returns NULL on error; call `focus_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn focus_engine_state(engine: *const FocusEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    json_to_cstr(&(*engine).engine.latest_state())
}

/// Health metrics as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `focus_engine_new`.
/// - Returns a newly allocated string that must be freed with `focus_free_string`.
/// - Returns NULL on error; call `focus_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn focus_engine_health_metrics(
    engine: *const FocusEngineHandle,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    json_to_cstr(&(*engine).engine.get_health_metrics())
}

/// Status as JSON `{"code": ..., "message": ...}`.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `focus_engine_new`.
/// - Returns a newly allocated string that must be freed with `focus_free_string`.
/// - Returns NULL on error; call `focus_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn focus_engine_status(engine: *const FocusEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let (code, message) = (*engine).engine.get_status_code();
    json_to_cstr(&StatusPayload { code, message })
}

/// Predicted trajectory `minutes` ahead as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `focus_engine_new`.
/// - Returns a newly allocated string that must be freed with `focus_free_string`.
/// - Returns NULL on error; call `focus_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn focus_engine_trajectory(
    engine: *const FocusEngineHandle,
    minutes: u32,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    json_to_cstr(&(*engine).engine.predict_trajectory(minutes))
}

/// FP calculation breakdown as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `focus_engine_new`.
/// - Returns a newly allocated string that must be freed with `focus_free_string`.
/// - Returns NULL on error; call `focus_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn focus_engine_debug(engine: *const FocusEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    json_to_cstr(&(*engine).engine.debug_fp_calculation())
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Focus functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Focus function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn focus_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Focus function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn focus_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Focus library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn focus_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        focus_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_engine_lifecycle() {
        unsafe {
            let engine = focus_engine_new(ptr::null(), 80, 75);
            assert!(!engine.is_null());

            let input = CString::new(r#"{"apm": 60.0, "counters": {"keystrokes": 12}}"#).unwrap();
            let state = take_string(focus_engine_update(engine, input.as_ptr()));
            let state: serde_json::Value = serde_json::from_str(&state).unwrap();
            assert_eq!(state["readiness"], 80);

            let metrics = take_string(focus_engine_health_metrics(engine));
            assert!(metrics.contains("engine_instance_id"));

            let status = take_string(focus_engine_status(engine));
            let status: serde_json::Value = serde_json::from_str(&status).unwrap();
            assert!(status["code"].is_string());

            let trajectory = take_string(focus_engine_trajectory(engine, 30));
            let trajectory: serde_json::Value = serde_json::from_str(&trajectory).unwrap();
            assert_eq!(trajectory["continue"].as_array().unwrap().len(), 7);

            let debug = take_string(focus_engine_debug(engine));
            assert!(debug.contains("FP_eff"));

            let latest = take_string(focus_engine_state(engine));
            assert!(latest.contains("effective_fp"));

            focus_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_config_from_json() {
        unsafe {
            let config = CString::new(r#"{"history_capacity": 10}"#).unwrap();
            let engine = focus_engine_new(config.as_ptr(), 70, 70);
            assert!(!engine.is_null());
            focus_engine_free(engine);

            let invalid = CString::new(r#"{"history_capacity": 0}"#).unwrap();
            let engine = focus_engine_new(invalid.as_ptr(), 70, 70);
            assert!(engine.is_null());

            let error = CStr::from_ptr(focus_last_error()).to_str().unwrap();
            assert!(error.contains("history_capacity"));
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let engine = focus_engine_new(ptr::null(), 75, 75);
            let invalid = CString::new("not json").unwrap();

            let result = focus_engine_update(engine, invalid.as_ptr());
            assert!(result.is_null());

            let error = focus_last_error();
            assert!(!error.is_null());
            assert!(!CStr::from_ptr(error).to_str().unwrap().is_empty());

            assert!(focus_engine_state(ptr::null()).is_null());
            focus_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = focus_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
