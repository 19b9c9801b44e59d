use windows::Win32::Foundation::{
    CloseHandle, ERROR_BAD_LENGTH, FILETIME, HANDLE, STILL_ACTIVE,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};
use windows::Win32::System::ProcessStatus::{
    GetProcessMemoryInfo, QueryWorkingSet, PROCESS_MEMORY_COUNTERS,
    PSAPI_WORKING_SET_INFORMATION,
};
use windows::Win32::System::SystemInformation::{GetSystemInfo, GetSystemTimeAsFileTime, SYSTEM_INFO};
use windows::Win32::System::Threading::{
    GetCurrentProcess, GetExitCodeProcess, GetProcessTimes, OpenProcess, TerminateProcess,
    PROCESS_QUERY_INFORMATION, PROCESS_TERMINATE, PROCESS_VM_READ,
};

use crate::error::{MonitorError, Result};
use crate::platform::ProcessEntry;

fn filetime_to_ticks(file_time: FILETIME) -> u64 {
    ((file_time.dwHighDateTime as u64) << 32) | file_time.dwLowDateTime as u64
}

/// UTC wallclock as a 64-bit 100 ns tick count, composed from the two
/// 32-bit FILETIME halves.
pub fn wallclock_ticks() -> u64 {
    let mut now = FILETIME::default();
    unsafe { GetSystemTimeAsFileTime(&mut now) };
    filetime_to_ticks(now)
}

fn page_size() -> u64 {
    let mut info = SYSTEM_INFO::default();
    unsafe { GetSystemInfo(&mut info) };
    info.dwPageSize as u64
}

/// Owning process handle with query and memory-read rights. The
/// current-process pseudo-handle is a sentinel and is never closed.
pub struct ProcessHandle {
    raw: HANDLE,
    is_current: bool,
}

unsafe impl Send for ProcessHandle {}
unsafe impl Sync for ProcessHandle {}

impl ProcessHandle {
    pub fn open(pid: u32) -> Result<Self> {
        let raw = unsafe { OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid) }
            .map_err(|_| MonitorError::ProcessHandle)?;
        if raw.is_invalid() {
            return Err(MonitorError::ProcessHandle);
        }
        Ok(Self { raw, is_current: false })
    }

    pub fn current() -> Self {
        Self { raw: unsafe { GetCurrentProcess() }, is_current: true }
    }

    pub fn is_alive(&self) -> bool {
        let mut exit_code = 0u32;
        unsafe { GetExitCodeProcess(self.raw, &mut exit_code) }.is_ok()
            && exit_code == STILL_ACTIVE.0 as u32
    }

    /// Kernel + user time in 100 ns ticks.
    pub fn cpu_times(&self) -> Result<u64> {
        let mut creation = FILETIME::default();
        let mut exit = FILETIME::default();
        let mut kernel = FILETIME::default();
        let mut user = FILETIME::default();
        unsafe { GetProcessTimes(self.raw, &mut creation, &mut exit, &mut kernel, &mut user) }
            .map_err(|_| MonitorError::ProcessHandle)?;
        Ok(filetime_to_ticks(kernel) + filetime_to_ticks(user))
    }

    /// Working-set size in bytes. The working-set query deliberately gets
    /// a one-entry buffer: the entry count is filled in even when the call
    /// reports the buffer too short. Falls back to the memory-counters
    /// query when the working-set query is unsupported.
    pub fn working_set_bytes(&self) -> Result<u64> {
        let mut info = PSAPI_WORKING_SET_INFORMATION::default();
        let status = unsafe {
            QueryWorkingSet(
                self.raw,
                &mut info as *mut _ as *mut _,
                std::mem::size_of::<PSAPI_WORKING_SET_INFORMATION>() as u32,
            )
        };
        let filled = match status {
            Ok(()) => true,
            Err(err) => err.code() == ERROR_BAD_LENGTH.to_hresult(),
        };
        if filled {
            return Ok(info.NumberOfEntries as u64 * page_size());
        }

        let mut counters = PROCESS_MEMORY_COUNTERS::default();
        unsafe {
            GetProcessMemoryInfo(
                self.raw,
                &mut counters,
                std::mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32,
            )
        }
        .map_err(|_| MonitorError::ProcessHandle)?;
        Ok(counters.WorkingSetSize as u64)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.is_current {
            unsafe {
                let _ = CloseHandle(self.raw);
            }
        }
    }
}

fn entry_image_name(entry: &PROCESSENTRY32W) -> String {
    let len = entry
        .szExeFile
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(entry.szExeFile.len());
    String::from_utf16_lossy(&entry.szExeFile[..len])
}

/// All live processes from one Toolhelp snapshot, in enumeration order.
pub fn enumerate_processes() -> Result<Vec<ProcessEntry>> {
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
        .map_err(|_| MonitorError::ProcessSnapshot)?;

    let mut entries = Vec::new();
    let mut entry = PROCESSENTRY32W {
        dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };

    unsafe {
        if Process32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                entries.push(ProcessEntry {
                    pid: entry.th32ProcessID,
                    parent_pid: entry.th32ParentProcessID,
                    image_name: entry_image_name(&entry),
                });
                if Process32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }
        let _ = CloseHandle(snapshot);
    }

    Ok(entries)
}

/// Terminates every process whose image name matches, case-insensitively.
/// Returns how many were killed.
pub fn terminate_processes_by_name(image_name: &str, exit_code: u32) -> usize {
    let entries = match enumerate_processes() {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut killed = 0;
    for entry in entries {
        if !entry.image_name.eq_ignore_ascii_case(image_name) {
            continue;
        }
        unsafe {
            if let Ok(handle) = OpenProcess(PROCESS_TERMINATE, false, entry.pid) {
                if TerminateProcess(handle, exit_code).is_ok() {
                    killed += 1;
                }
                let _ = CloseHandle(handle);
            }
        }
    }
    killed
}
