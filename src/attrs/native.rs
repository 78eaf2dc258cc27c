//! Extended attribute backend using the platform syscalls
//!
//! macOS stores AutoPkg's names as-is. Linux only allows unprivileged
//! attributes in the `user.` namespace, so names are mapped there.

use super::AttributeStore;
use crate::error::{RunnerError, RunnerResult};
use async_trait::async_trait;
use std::path::Path;

/// Attribute store backed by real extended attributes
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeAttributes;

impl NativeAttributes {
    /// Create the native backend
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AttributeStore for NativeAttributes {
    async fn get(&self, path: &Path, name: &str) -> RunnerResult<Option<Vec<u8>>> {
        sys::get(path, name).map_err(|e| attribute_error(path, name, e))
    }

    async fn set(&self, path: &Path, name: &str, value: &[u8]) -> RunnerResult<()> {
        sys::set(path, name, value).map_err(|e| attribute_error(path, name, e))
    }
}

fn attribute_error(path: &Path, name: &str, e: std::io::Error) -> RunnerError {
    RunnerError::Attribute {
        path: path.to_path_buf(),
        name: name.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
mod sys {
    use std::ffi::CString;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    #[cfg(target_os = "macos")]
    const MISSING: i32 = libc::ENOATTR;
    #[cfg(target_os = "linux")]
    const MISSING: i32 = libc::ENODATA;

    fn c_path(path: &Path) -> io::Result<CString> {
        CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    fn c_name(name: &str) -> io::Result<CString> {
        #[cfg(target_os = "linux")]
        let name = format!("user.{}", name);
        CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    #[cfg(target_os = "macos")]
    unsafe fn raw_get(
        path: &CString,
        name: &CString,
        buf: *mut libc::c_void,
        len: usize,
    ) -> libc::ssize_t {
        libc::getxattr(path.as_ptr(), name.as_ptr(), buf, len, 0, 0)
    }

    #[cfg(target_os = "linux")]
    unsafe fn raw_get(
        path: &CString,
        name: &CString,
        buf: *mut libc::c_void,
        len: usize,
    ) -> libc::ssize_t {
        libc::getxattr(path.as_ptr(), name.as_ptr(), buf, len)
    }

    pub fn get(path: &Path, name: &str) -> io::Result<Option<Vec<u8>>> {
        let path = c_path(path)?;
        let name = c_name(name)?;

        // First call sizes the value, second reads it
        let size = unsafe { raw_get(&path, &name, std::ptr::null_mut(), 0) };
        if size < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(code) if code == MISSING => Ok(None),
                _ => Err(err),
            };
        }

        let mut buf = vec![0u8; size as usize];
        let read = unsafe { raw_get(&path, &name, buf.as_mut_ptr().cast(), buf.len()) };
        if read < 0 {
            return Err(io::Error::last_os_error());
        }
        buf.truncate(read as usize);
        Ok(Some(buf))
    }

    pub fn set(path: &Path, name: &str, value: &[u8]) -> io::Result<()> {
        let path = c_path(path)?;
        let name = c_name(name)?;

        #[cfg(target_os = "macos")]
        let rc = unsafe {
            libc::setxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_ptr().cast(),
                value.len(),
                0,
                0,
            )
        };
        #[cfg(target_os = "linux")]
        let rc = unsafe {
            libc::setxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_ptr().cast(),
                value.len(),
                0,
            )
        };

        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
mod sys {
    use std::io;
    use std::path::Path;

    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "extended attributes are not supported on this platform",
        )
    }

    pub fn get(_path: &Path, _name: &str) -> io::Result<Option<Vec<u8>>> {
        Err(unsupported())
    }

    pub fn set(_path: &Path, _name: &str, _value: &[u8]) -> io::Result<()> {
        Err(unsupported())
    }
}
