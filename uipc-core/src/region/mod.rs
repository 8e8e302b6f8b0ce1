//! Shared-region cache.
//!
//! IPC clients publish their request blocks in a named shared-memory
//! segment and refer to it by an opaque handle. The cache keeps at most
//! one segment mapped, remapping only when a request names a different
//! handle.
//!
//! How a handle becomes a mapping is platform-specific and sits behind
//! [`RegionSource`]:
//!
//! - [`AtomRegionSource`] (Windows): global atom → file-mapping object.
//! - [`DirRegionSource`]: files in a directory, memory-mapped with
//!   `memmap2`. Used off Windows and in tests.

mod file;
#[cfg(target_os = "windows")]
mod win32;

pub use file::{DirRegionSource, FileMapping};
#[cfg(target_os = "windows")]
pub use win32::{AtomRegionSource, ViewMapping};

use std::fmt;

use tracing::debug;

use crate::error::MapError;

/// Fixed size of a shared region in bytes.
pub const REGION_LEN: usize = 0x7F00 + 0x100;

// ── RegionHandle ─────────────────────────────────────────────────

/// Opaque identifier naming a shared region. Zero is the null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RegionHandle(u32);

impl RegionHandle {
    pub const NULL: Self = Self(0);

    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RegionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

// ── Platform seam ────────────────────────────────────────────────

/// A live read/write mapping. Dropping it unmaps and closes it.
pub trait RegionMapping {
    /// The whole mapped view.
    fn as_mut_slice(&mut self) -> &mut [u8];
}

/// Turns handles into mappings.
pub trait RegionSource {
    type Mapping: RegionMapping;

    /// Resolve `handle` to the name of a system object.
    fn resolve(&self, handle: RegionHandle) -> Result<String, MapError>;

    /// Open and map the object called `name` for reading and writing.
    fn open(&mut self, name: &str) -> Result<Self::Mapping, MapError>;
}

// ── SharedRegion ─────────────────────────────────────────────────

/// One mapped segment, owned by the [`RegionCache`].
pub struct SharedRegion<M> {
    handle: RegionHandle,
    name: String,
    mapping: M,
}

impl<M: RegionMapping> SharedRegion<M> {
    pub fn handle(&self) -> RegionHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Always [`REGION_LEN`].
    pub fn len(&self) -> usize {
        REGION_LEN
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The first [`REGION_LEN`] bytes of the mapping.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mapping.as_mut_slice()[..REGION_LEN]
    }
}

impl<M> fmt::Debug for SharedRegion<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRegion")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .finish()
    }
}

// ── RegionCache ──────────────────────────────────────────────────

/// Holds at most one mapped region, keyed by its handle.
pub struct RegionCache<S: RegionSource> {
    source: S,
    current: Option<SharedRegion<S::Mapping>>,
}

impl<S: RegionSource> RegionCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            current: None,
        }
    }

    /// Return the mapping for `handle`, mapping it if needed.
    ///
    /// A hit on the cached handle performs no OS call. A miss releases
    /// the previous mapping before anything else; if resolving or mapping
    /// then fails, the cache is left empty.
    pub fn ensure_mapped(
        &mut self,
        handle: RegionHandle,
    ) -> Result<&mut SharedRegion<S::Mapping>, MapError> {
        let region = match self.current.take() {
            Some(region) if region.handle == handle => region,
            stale => {
                if let Some(old) = stale {
                    debug!(handle = %old.handle, name = %old.name, "releasing shared region");
                }
                self.map(handle)?
            }
        };
        Ok(self.current.insert(region))
    }

    /// Unmap the current region, if any.
    pub fn release(&mut self) {
        if let Some(old) = self.current.take() {
            debug!(handle = %old.handle, name = %old.name, "releasing shared region");
        }
    }

    /// Handle of the live mapping.
    pub fn current_handle(&self) -> Option<RegionHandle> {
        self.current.as_ref().map(|r| r.handle)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn map(&mut self, handle: RegionHandle) -> Result<SharedRegion<S::Mapping>, MapError> {
        if handle.is_null() {
            return Err(MapError::HandleResolutionFailed {
                handle,
                reason: "null handle".into(),
            });
        }

        let name = self.source.resolve(handle)?;
        let mut mapping = self.source.open(&name)?;

        let mapped = mapping.as_mut_slice().len();
        if mapped < REGION_LEN {
            return Err(MapError::MapFailed {
                name,
                reason: format!("view is {mapped} bytes, need {REGION_LEN}"),
            });
        }

        debug!(%handle, %name, "mapped shared region");
        Ok(SharedRegion {
            handle,
            name,
            mapping,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use super::*;

    /// In-memory segments with a shared log of OS-level calls.
    #[derive(Default)]
    struct FakeSource {
        segments: HashMap<u32, usize>,
        calls: Rc<RefCell<Vec<String>>>,
    }

    struct FakeMapping {
        bytes: Vec<u8>,
        name: String,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl RegionMapping for FakeMapping {
        fn as_mut_slice(&mut self) -> &mut [u8] {
            &mut self.bytes
        }
    }

    impl Drop for FakeMapping {
        fn drop(&mut self) {
            self.calls.borrow_mut().push(format!("unmap {}", self.name));
        }
    }

    impl RegionSource for FakeSource {
        type Mapping = FakeMapping;

        fn resolve(&self, handle: RegionHandle) -> Result<String, MapError> {
            self.calls.borrow_mut().push(format!("resolve {}", handle.raw()));
            if self.segments.contains_key(&handle.raw()) {
                Ok(format!("seg{}", handle.raw()))
            } else {
                Err(MapError::HandleResolutionFailed {
                    handle,
                    reason: "unknown atom".into(),
                })
            }
        }

        fn open(&mut self, name: &str) -> Result<FakeMapping, MapError> {
            self.calls.borrow_mut().push(format!("open {name}"));
            let raw: u32 = name.trim_start_matches("seg").parse().unwrap();
            Ok(FakeMapping {
                bytes: vec![0; self.segments[&raw]],
                name: name.to_string(),
                calls: Rc::clone(&self.calls),
            })
        }
    }

    fn cache_with(segments: &[(u32, usize)]) -> (RegionCache<FakeSource>, Rc<RefCell<Vec<String>>>) {
        let source = FakeSource {
            segments: segments.iter().copied().collect(),
            ..Default::default()
        };
        let calls = Rc::clone(&source.calls);
        (RegionCache::new(source), calls)
    }

    #[test]
    fn same_handle_maps_once() {
        let (mut cache, calls) = cache_with(&[(7, REGION_LEN)]);
        let h = RegionHandle::new(7);

        cache.ensure_mapped(h).unwrap().bytes_mut()[0] = 0xAB;
        let region = cache.ensure_mapped(h).unwrap();
        assert_eq!(region.bytes_mut()[0], 0xAB);
        assert_eq!(region.len(), REGION_LEN);

        assert_eq!(*calls.borrow(), vec!["resolve 7", "open seg7"]);
    }

    #[test]
    fn new_handle_releases_previous_first() {
        let (mut cache, calls) = cache_with(&[(1, REGION_LEN), (2, REGION_LEN)]);
        cache.ensure_mapped(RegionHandle::new(1)).unwrap();
        cache.ensure_mapped(RegionHandle::new(2)).unwrap();

        assert_eq!(
            *calls.borrow(),
            vec!["resolve 1", "open seg1", "unmap seg1", "resolve 2", "open seg2"]
        );
        assert_eq!(cache.current_handle(), Some(RegionHandle::new(2)));
    }

    #[test]
    fn failure_leaves_cache_empty() {
        let (mut cache, calls) = cache_with(&[(1, REGION_LEN)]);
        cache.ensure_mapped(RegionHandle::new(1)).unwrap();

        let err = cache.ensure_mapped(RegionHandle::new(9)).unwrap_err();
        assert!(matches!(err, MapError::HandleResolutionFailed { .. }));
        assert_eq!(cache.current_handle(), None);
        assert!(calls.borrow().contains(&"unmap seg1".to_string()));

        // Safe to retry with a good handle.
        cache.ensure_mapped(RegionHandle::new(1)).unwrap();
        assert_eq!(cache.current_handle(), Some(RegionHandle::new(1)));
    }

    #[test]
    fn null_handle_never_reaches_the_source() {
        let (mut cache, calls) = cache_with(&[]);
        let err = cache.ensure_mapped(RegionHandle::NULL).unwrap_err();
        assert!(matches!(err, MapError::HandleResolutionFailed { .. }));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn short_mapping_is_rejected() {
        let (mut cache, _calls) = cache_with(&[(3, REGION_LEN - 1)]);
        let err = cache.ensure_mapped(RegionHandle::new(3)).unwrap_err();
        assert!(matches!(err, MapError::MapFailed { .. }));
        assert_eq!(cache.current_handle(), None);
    }

    #[test]
    fn release_is_idempotent() {
        let (mut cache, calls) = cache_with(&[(4, REGION_LEN)]);
        cache.ensure_mapped(RegionHandle::new(4)).unwrap();
        cache.release();
        cache.release();
        let unmaps = calls.borrow().iter().filter(|c| c.starts_with("unmap")).count();
        assert_eq!(unmaps, 1);
        assert_eq!(cache.current_handle(), None);
    }

    #[test]
    fn handle_display() {
        assert_eq!(RegionHandle::new(0xC0DE).to_string(), "0xc0de");
        assert!(RegionHandle::NULL.is_null());
    }
}
