//! FFI bindings for Pulse Metrics
//!
//! This module provides C-compatible functions for calling the engine from
//! dashboard hosts written in other languages. All functions use C strings
//! (null-terminated) and return allocated memory that must be freed by the
//! caller using `pulse_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::PipelineConfig;
use crate::encoder::{encode_table_csv, TableKind};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::pipeline::{analyze_csv, analyze_csv_to_json};

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

fn finish(result: AnalyticsResult<String>) -> *mut c_char {
    match result {
        Ok(out) => string_to_cstr(&out),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn parse_config(config_json: Option<String>) -> AnalyticsResult<PipelineConfig> {
    match config_json.as_deref().map(str::trim) {
        Some(json) if !json.is_empty() => PipelineConfig::from_json(json),
        _ => Ok(PipelineConfig::default()),
    }
}

/// Analyze CSV text and return the report envelope as JSON.
///
/// # Safety
/// - `csv` must be a valid null-terminated C string.
/// - `config_json` may be NULL (defaults) or a null-terminated JSON object.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_analyze_csv(
    csv: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let csv_str = match cstr_to_string(csv) {
        Some(s) => s,
        None => {
            set_last_error("Invalid CSV string pointer");
            return ptr::null_mut();
        }
    };

    finish(analyze_csv_to_json(csv_str, cstr_to_string(config_json)))
}

/// Analyze CSV text and return a single table rendered as CSV.
///
/// `table` names one of: daily, weekly, monthly, revenue_trend, cohorts,
/// segments, churn, loyalty, clusters, cluster_profiles.
///
/// # Safety
/// - `csv` and `table` must be valid null-terminated C strings.
/// - `config_json` may be NULL.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_export_table(
    csv: *const c_char,
    config_json: *const c_char,
    table: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let csv_str = match cstr_to_string(csv) {
        Some(s) => s,
        None => {
            set_last_error("Invalid CSV string pointer");
            return ptr::null_mut();
        }
    };
    let table_name = match cstr_to_string(table) {
        Some(s) => s,
        None => {
            set_last_error("Invalid table name pointer");
            return ptr::null_mut();
        }
    };

    let result = parse_config(cstr_to_string(config_json)).and_then(|config| {
        let kind: TableKind = serde_json::from_value(serde_json::Value::String(table_name))
            .map_err(AnalyticsError::Json)?;
        let report = analyze_csv(&csv_str, &config)?;
        encode_table_csv(&report, kind)
    });
    finish(result)
}

/// Free a string returned by Pulse functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Pulse function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pulse_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Pulse function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn pulse_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn pulse_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
