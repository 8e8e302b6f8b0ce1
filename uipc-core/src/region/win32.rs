//! Win32 regions: a global atom names a file-mapping object.

use std::ffi::c_void;

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::DataExchange::GlobalGetAtomNameW;
use windows::Win32::System::Memory::{
    FILE_MAP_ALL_ACCESS, MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile,
    OpenFileMappingW, UnmapViewOfFile, VirtualQuery,
};
use windows::core::PCWSTR;

use super::{RegionHandle, RegionMapping, RegionSource};
use crate::error::MapError;

/// Longest atom name Windows stores, plus the terminator.
const MAX_ATOM_NAME: usize = 256;

/// Resolves handles through the global atom table.
#[derive(Debug, Default, Clone, Copy)]
pub struct AtomRegionSource;

impl RegionSource for AtomRegionSource {
    type Mapping = ViewMapping;

    fn resolve(&self, handle: RegionHandle) -> Result<String, MapError> {
        let atom = u16::try_from(handle.raw()).map_err(|_| MapError::HandleResolutionFailed {
            handle,
            reason: "not an atom".into(),
        })?;

        let mut buf = [0u16; MAX_ATOM_NAME];
        let len = unsafe { GlobalGetAtomNameW(atom, &mut buf) } as usize;
        if len == 0 {
            return Err(MapError::HandleResolutionFailed {
                handle,
                reason: windows::core::Error::from_win32().to_string(),
            });
        }
        Ok(String::from_utf16_lossy(&buf[..len]))
    }

    fn open(&mut self, name: &str) -> Result<ViewMapping, MapError> {
        let map_failed = |e: windows::core::Error| MapError::MapFailed {
            name: name.to_string(),
            reason: e.to_string(),
        };

        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let handle = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS.0, false, PCWSTR(wide.as_ptr())) }
            .map_err(map_failed)?;

        let view = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, 0) };
        if view.Value.is_null() {
            let err = windows::core::Error::from_win32();
            unsafe {
                let _ = CloseHandle(handle);
            }
            return Err(map_failed(err));
        }

        let mut info = MEMORY_BASIC_INFORMATION::default();
        let written = unsafe {
            VirtualQuery(
                Some(view.Value as *const c_void),
                &mut info,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        let len = if written == 0 { 0 } else { info.RegionSize };

        // Dropping the mapping unmaps the view and closes the handle even
        // when the caller rejects it for being too short.
        Ok(ViewMapping { handle, view, len })
    }
}

/// A mapped view of a named file-mapping object.
pub struct ViewMapping {
    handle: HANDLE,
    view: MEMORY_MAPPED_VIEW_ADDRESS,
    len: usize,
}

impl RegionMapping for ViewMapping {
    fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: `view` is a live read/write mapping of at least `len`
        // bytes (VirtualQuery), and `self` is its only owner.
        unsafe { std::slice::from_raw_parts_mut(self.view.Value.cast::<u8>(), self.len) }
    }
}

impl Drop for ViewMapping {
    fn drop(&mut self) {
        unsafe {
            let _ = UnmapViewOfFile(self.view);
            let _ = CloseHandle(self.handle);
        }
    }
}
