//! ReadDirectoryChangesW change source

use crate::config::WatchConfig;
use crate::record::RawChangeBatch;
use crate::source::{ChangeSource, OpenError, SourceError};
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use tracing::debug;

use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_NOTIFY_ENUM_DIR, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, ReadDirectoryChangesW, FILE_FLAG_BACKUP_SEMANTICS, FILE_LIST_DIRECTORY,
    FILE_NOTIFY_CHANGE_ATTRIBUTES, FILE_NOTIFY_CHANGE_CREATION, FILE_NOTIFY_CHANGE_DIR_NAME,
    FILE_NOTIFY_CHANGE_FILE_NAME, FILE_NOTIFY_CHANGE_LAST_ACCESS, FILE_NOTIFY_CHANGE_LAST_WRITE,
    FILE_NOTIFY_CHANGE_SECURITY, FILE_NOTIFY_CHANGE_SIZE, FILE_SHARE_DELETE, FILE_SHARE_READ,
    FILE_SHARE_WRITE, OPEN_EXISTING,
};

const NOTIFY_FILTER: u32 = FILE_NOTIFY_CHANGE_SECURITY
    | FILE_NOTIFY_CHANGE_CREATION
    | FILE_NOTIFY_CHANGE_LAST_ACCESS
    | FILE_NOTIFY_CHANGE_LAST_WRITE
    | FILE_NOTIFY_CHANGE_SIZE
    | FILE_NOTIFY_CHANGE_ATTRIBUTES
    | FILE_NOTIFY_CHANGE_DIR_NAME
    | FILE_NOTIFY_CHANGE_FILE_NAME;

/// An open directory handle read with ReadDirectoryChangesW
pub struct DirectoryHandle {
    handle: HANDLE,
    subtree: bool,
    // u32 storage keeps the buffer DWORD-aligned as the API requires
    buffer: Vec<u32>,
}

impl DirectoryHandle {
    pub fn open(config: &WatchConfig) -> Result<Self, OpenError> {
        OpenError::check_directory(&config.root)?;

        let wide: Vec<u16> = config
            .root
            .as_os_str()
            .encode_wide()
            .chain(Some(0))
            .collect();

        // Safety: `wide` is NUL-terminated and outlives the call
        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                FILE_LIST_DIRECTORY,
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                ptr::null(),
                OPEN_EXISTING,
                FILE_FLAG_BACKUP_SEMANTICS,
                0,
            )
        };

        if handle == INVALID_HANDLE_VALUE {
            return Err(OpenError::from_io(&config.root, io::Error::last_os_error()));
        }

        debug!("Opened directory handle for {}", config.root.display());

        Ok(Self {
            handle,
            subtree: config.subtree,
            buffer: vec![0u32; (config.buffer_size + 3) / 4],
        })
    }
}

impl ChangeSource for DirectoryHandle {
    fn read_batch(&mut self) -> Result<RawChangeBatch, SourceError> {
        let capacity = (self.buffer.len() * 4) as u32;
        let mut bytes_read: u32 = 0;

        // Safety: the buffer is valid for `capacity` bytes and the call is
        // synchronous (no OVERLAPPED), so nothing outlives this frame.
        let ok = unsafe {
            ReadDirectoryChangesW(
                self.handle,
                self.buffer.as_mut_ptr().cast(),
                capacity,
                self.subtree as i32,
                NOTIFY_FILTER,
                &mut bytes_read,
                ptr::null_mut(),
                None,
            )
        };

        if ok == 0 {
            let code = unsafe { GetLastError() };
            if code == ERROR_NOTIFY_ENUM_DIR {
                return Err(SourceError::Overflow);
            }
            return Err(SourceError::Terminated(code));
        }

        // Success with nothing written means the buffer was too small
        if bytes_read == 0 {
            return Err(SourceError::Overflow);
        }

        let len = (bytes_read as usize).min(self.buffer.len() * 4);
        // Safety: `len` bytes of the u32 buffer were initialized by the call
        let bytes =
            unsafe { std::slice::from_raw_parts(self.buffer.as_ptr().cast::<u8>(), len) };
        Ok(RawChangeBatch::from_bytes(bytes.to_vec()))
    }
}

impl Drop for DirectoryHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}
