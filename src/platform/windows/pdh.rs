use windows::core::PCWSTR;
use windows::Win32::Foundation::ERROR_SUCCESS;
use windows::Win32::System::Performance::{
    PdhAddEnglishCounterW, PdhCloseQuery, PdhCollectQueryDataEx, PdhGetFormattedCounterArrayW,
    PdhOpenQueryW, PdhRemoveCounter, PDH_FMT, PDH_FMT_COUNTERVALUE_ITEM_W, PDH_FMT_DOUBLE,
    PDH_FMT_LARGE, PDH_FMT_NOCAP100, PDH_MORE_DATA,
};

use super::event::TickEvent;
use super::to_wide;
use crate::error::{MonitorError, Result};
use crate::platform::{CounterFormat, CounterItem, CounterValue};

/// Open performance-counter query. Counters added to it must be dropped
/// before the query itself.
pub struct CounterQuery {
    handle: isize,
}

unsafe impl Send for CounterQuery {}
unsafe impl Sync for CounterQuery {}

impl CounterQuery {
    pub fn open() -> Result<Self> {
        let mut handle = 0isize;
        let status = unsafe { PdhOpenQueryW(PCWSTR::null(), 0, &mut handle) };
        if status != ERROR_SUCCESS.0 {
            return Err(MonitorError::Pdh(status));
        }
        Ok(Self { handle })
    }

    /// Adds a counter by its locale-independent path string.
    pub fn add_counter(&self, path: &str) -> Result<Counter> {
        let wide = to_wide(path);
        let mut handle = 0isize;
        let status = unsafe {
            PdhAddEnglishCounterW(self.handle, PCWSTR(wide.as_ptr()), 0, &mut handle)
        };
        if status != ERROR_SUCCESS.0 {
            return Err(MonitorError::Pdh(status));
        }
        Ok(Counter { handle })
    }

    /// Arms periodic collection: the query refreshes every
    /// `interval_secs` and signals `event` after each pass.
    pub fn start_periodic(&self, interval_secs: u32, event: &TickEvent) -> Result<()> {
        let status = unsafe { PdhCollectQueryDataEx(self.handle, interval_secs, event.raw()) };
        if status != ERROR_SUCCESS.0 {
            return Err(MonitorError::Pdh(status));
        }
        Ok(())
    }
}

impl Drop for CounterQuery {
    fn drop(&mut self) {
        unsafe {
            let _ = PdhCloseQuery(self.handle);
        }
    }
}

/// One counter inside a query.
pub struct Counter {
    handle: isize,
}

unsafe impl Send for Counter {}
unsafe impl Sync for Counter {}

impl Counter {
    /// Formatted per-instance values via the size-then-read call pair.
    /// Any status other than success yields an empty list; a failed read
    /// must not poison the tick.
    pub fn formatted_items(&self, format: CounterFormat) -> Vec<CounterItem> {
        let fmt = match format {
            CounterFormat::Double => PDH_FMT(PDH_FMT_DOUBLE.0 | PDH_FMT_NOCAP100.0),
            CounterFormat::Large => PDH_FMT_LARGE,
        };

        let mut buffer_size = 0u32;
        let mut item_count = 0u32;
        let status = unsafe {
            PdhGetFormattedCounterArrayW(self.handle, fmt, &mut buffer_size, &mut item_count, None)
        };
        if status != PDH_MORE_DATA || buffer_size == 0 {
            return Vec::new();
        }

        let mut buffer = vec![0u8; buffer_size as usize];
        let item_ptr = buffer.as_mut_ptr() as *mut PDH_FMT_COUNTERVALUE_ITEM_W;
        let status = unsafe {
            PdhGetFormattedCounterArrayW(
                self.handle,
                fmt,
                &mut buffer_size,
                &mut item_count,
                Some(item_ptr),
            )
        };
        if status != ERROR_SUCCESS.0 {
            return Vec::new();
        }

        let raw_items = unsafe { std::slice::from_raw_parts(item_ptr, item_count as usize) };
        raw_items
            .iter()
            .filter_map(|item| {
                let name = if item.szName.is_null() {
                    return None;
                } else {
                    String::from_utf16_lossy(unsafe { item.szName.as_wide() })
                };
                let value = match format {
                    CounterFormat::Double => {
                        CounterValue::Double(unsafe { item.FmtValue.Anonymous.doubleValue })
                    }
                    CounterFormat::Large => {
                        CounterValue::Large(unsafe { item.FmtValue.Anonymous.largeValue })
                    }
                };
                Some(CounterItem { name, value })
            })
            .collect()
    }
}

impl Drop for Counter {
    fn drop(&mut self) {
        unsafe {
            let _ = PdhRemoveCounter(self.handle);
        }
    }
}
