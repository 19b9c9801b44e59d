pub mod dxgi;
pub mod event;
pub mod pdh;
pub mod process;

fn to_wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}
