use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, IDXGIFactory1, DXGI_ADAPTER_DESC1, DXGI_ERROR_NOT_FOUND,
};

use crate::error::{MonitorError, Result};
use crate::platform::AdapterInfo;

/// Walks the DXGI factory and reports every adapter. Vendor filtering is
/// the caller's business.
pub fn enumerate_adapters() -> Result<Vec<AdapterInfo>> {
    let factory: IDXGIFactory1 = unsafe { CreateDXGIFactory1() }
        .map_err(|_| MonitorError::AdapterEnumeration)?;

    let mut adapters = Vec::new();
    let mut index = 0u32;
    loop {
        let adapter = match unsafe { factory.EnumAdapters1(index) } {
            Ok(adapter) => adapter,
            Err(err) if err.code() == DXGI_ERROR_NOT_FOUND => break,
            Err(_) => break,
        };
        index += 1;

        let mut desc = DXGI_ADAPTER_DESC1::default();
        if unsafe { adapter.GetDesc1(&mut desc) }.is_err() {
            continue;
        }

        let len = desc
            .Description
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(desc.Description.len());
        adapters.push(AdapterInfo {
            description: String::from_utf16_lossy(&desc.Description[..len]),
            dedicated_video_memory: desc.DedicatedVideoMemory as u64,
            vendor_id: desc.VendorId,
        });
    }

    Ok(adapters)
}
