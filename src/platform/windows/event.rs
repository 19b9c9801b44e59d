use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::System::Threading::{CreateEventW, SetEvent, WaitForSingleObject, INFINITE};

use crate::error::{MonitorError, Result};

/// Auto-reset event the counter collector signals once per interval and
/// `shutdown` signals once to release the sampler.
pub struct TickEvent {
    handle: HANDLE,
}

unsafe impl Send for TickEvent {}
unsafe impl Sync for TickEvent {}

impl TickEvent {
    pub fn new() -> Result<Self> {
        let handle = unsafe { CreateEventW(None, false, false, PCWSTR::null()) }
            .map_err(|_| MonitorError::TickEvent)?;
        Ok(Self { handle })
    }

    /// Blocks until the event is signalled; false on a wait failure.
    pub fn wait(&self) -> bool {
        unsafe { WaitForSingleObject(self.handle, INFINITE) == WAIT_OBJECT_0 }
    }

    pub fn signal(&self) {
        unsafe {
            let _ = SetEvent(self.handle);
        }
    }

    pub(super) fn raw(&self) -> HANDLE {
        self.handle
    }
}

impl Drop for TickEvent {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}
