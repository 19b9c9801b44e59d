//! Vendor-CLI measurement path. Every read of the child's stdout
//! publishes a liveness timestamp the watchdog checks; a stuck CLI is
//! therefore always detectable and killable from outside.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::platform::clock;
use crate::utils::encoding::decode_console_line;

pub const NVSMI_BINARY: &str = "nvidia-smi";

/// Image name the watchdog matches when it has to kill a stuck CLI.
#[cfg(windows)]
pub const NVSMI_IMAGE_NAME: &str = "nvidia-smi.exe";
#[cfg(not(windows))]
pub const NVSMI_IMAGE_NAME: &str = "nvidia-smi";

pub(crate) const MIB: u64 = 1024 * 1024;

/// Monotonic second of the most recent CLI stdout activity; 0 when no
/// read is in flight. All concurrent probes publish into this one slot.
static NVSMI_ALIVE: AtomicU64 = AtomicU64::new(0);

/// Latched on the first spawn failure; later calls short-circuit.
static NVSMI_MISSING: AtomicBool = AtomicBool::new(false);

pub fn alive_timestamp() -> u64 {
    NVSMI_ALIVE.load(Ordering::SeqCst)
}

fn touch_alive() {
    NVSMI_ALIVE.store(clock::monotonic_secs(), Ordering::SeqCst);
}

pub(crate) fn clear_alive() {
    NVSMI_ALIVE.store(0, Ordering::SeqCst);
}

fn spawn(args: &[&str]) -> Option<Child> {
    if NVSMI_MISSING.load(Ordering::SeqCst) {
        return None;
    }

    let mut command = Command::new(NVSMI_BINARY);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    match command.spawn() {
        Ok(child) => Some(child),
        Err(err) => {
            log::warn!("nvidia-smi unavailable: {err}");
            NVSMI_MISSING.store(true, Ordering::SeqCst);
            None
        }
    }
}

struct LineReader<R: Read> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    fn new(source: R) -> Self {
        Self { reader: BufReader::new(source), buffer: Vec::new() }
    }

    /// One decoded line, or `None` on EOF/error. The liveness slot is
    /// published immediately before and after the blocking read.
    fn next_line(&mut self) -> Option<String> {
        touch_alive();
        self.buffer.clear();
        let read = self.reader.read_until(b'\n', &mut self.buffer).ok()?;
        touch_alive();
        if read == 0 {
            None
        } else {
            Some(decode_console_line(&self.buffer))
        }
    }
}

fn run_query(args: &[&str]) -> Option<Vec<String>> {
    let mut child = spawn(args)?;
    let stdout = child.stdout.take()?;
    let mut reader = LineReader::new(stdout);
    let mut lines = Vec::new();
    while let Some(line) = reader.next_line() {
        lines.push(line);
    }
    clear_alive();
    let _ = child.wait();
    Some(lines)
}

/// One card name per line; at least one non-empty name required.
pub fn query_card_names() -> Option<Vec<String>> {
    let lines = run_query(&["--query-gpu=name", "--format=csv,noheader"])?;
    let names: Vec<String> = lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

fn memory_field_mib(magnitude: &str, unit: &str) -> Option<u64> {
    let value: u64 = magnitude.parse().ok()?;
    Some(if unit.starts_with('G') { value * 1024 } else { value })
}

/// `<total> <unit> <free> <unit>` for one card, normalised to MiB.
pub(crate) fn parse_memory_line(line: &str) -> Option<(u64, u64)> {
    let fields: Vec<&str> = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|field| !field.is_empty())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    let total = memory_field_mib(fields[0], fields[1])?;
    let free = memory_field_mib(fields[2], fields[3])?;
    Some((total, free))
}

/// Per-card `(total, free)` video memory in MiB.
pub fn query_memory_per_card() -> Option<Vec<(u64, u64)>> {
    let lines = run_query(&["--query-gpu=memory.total,memory.free", "--format=csv,noheader"])?;
    let cards: Vec<(u64, u64)> = lines.iter().filter_map(|line| parse_memory_line(line)).collect();
    if cards.is_empty() {
        None
    } else {
        Some(cards)
    }
}

/// GPU temperature in degrees Celsius.
pub fn query_temperature_c() -> Option<i64> {
    let lines = run_query(&["--query-gpu=temperature.gpu", "--format=csv,noheader"])?;
    lines.iter().find_map(|line| line.trim().parse::<i64>().ok())
}

/// Column indices learned from the stream header
/// (`# gpu ... sm mem enc dec ...`).
pub(crate) struct DmonColumns {
    gpu: usize,
    sm: usize,
    mem: usize,
    enc: usize,
    dec: usize,
}

pub(crate) fn parse_dmon_header(line: &str) -> Option<DmonColumns> {
    let body = line.trim_start().strip_prefix('#')?;
    let mut gpu = None;
    let mut sm = None;
    let mut mem = None;
    let mut enc = None;
    let mut dec = None;
    for (index, token) in body.split_whitespace().enumerate() {
        match token {
            "gpu" => gpu = Some(index),
            "sm" => sm = Some(index),
            "mem" => mem = Some(index),
            "enc" => enc = Some(index),
            "dec" => dec = Some(index),
            _ => {}
        }
    }
    Some(DmonColumns { gpu: gpu?, sm: sm?, mem: mem?, enc: enc?, dec: dec? })
}

#[derive(Debug, PartialEq)]
pub(crate) struct DmonRow {
    pub gpu: i64,
    pub sm: f64,
    pub mem: f64,
    pub enc: f64,
    pub dec: f64,
}

fn field_pct(field: &str) -> f64 {
    // unsupported columns print `-`
    field.parse().unwrap_or(0.0)
}

pub(crate) fn parse_dmon_row(columns: &DmonColumns, line: &str) -> Option<DmonRow> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let last = columns
        .gpu
        .max(columns.sm)
        .max(columns.mem)
        .max(columns.enc)
        .max(columns.dec);
    if fields.len() <= last {
        return None;
    }
    let gpu = fields[columns.gpu].parse::<i64>().ok()?;
    Some(DmonRow {
        gpu,
        sm: field_pct(fields[columns.sm]),
        mem: field_pct(fields[columns.mem]),
        enc: field_pct(fields[columns.enc]),
        dec: field_pct(fields[columns.dec]),
    })
}

/// One finished interval: per-GPU means of the streamed percentages.
#[derive(Debug, PartialEq)]
pub(crate) struct DmonRates {
    pub sm: f64,
    pub mem: f64,
    pub enc: f64,
    pub dec: f64,
}

pub(crate) fn finalize_rates(rows: &[DmonRow]) -> Option<DmonRates> {
    if rows.is_empty() {
        return None;
    }
    let count = rows.len() as f64;
    Some(DmonRates {
        sm: rows.iter().map(|row| row.sm).sum::<f64>() / count,
        mem: rows.iter().map(|row| row.mem).sum::<f64>() / count,
        enc: rows.iter().map(|row| row.enc).sum::<f64>() / count,
        dec: rows.iter().map(|row| row.dec).sum::<f64>() / count,
    })
}

/// Long-running `dmon` stream. An interval is delimited by the next
/// `gpu == 0` row; each finished interval is handed to `publish`. Runs
/// until `running` clears or the tool goes missing; a died stream is
/// respawned after a short pause.
pub(crate) fn stream_engine_details(
    running: &AtomicBool,
    mut publish: impl FnMut(DmonRates),
) {
    while running.load(Ordering::SeqCst) {
        let mut child = match spawn(&["dmon", "-d", "5"]) {
            Some(child) => child,
            None => break,
        };
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                break;
            }
        };

        let mut reader = LineReader::new(stdout);
        let mut columns: Option<DmonColumns> = None;
        let mut pending: Vec<DmonRow> = Vec::new();

        while running.load(Ordering::SeqCst) {
            let line = match reader.next_line() {
                Some(line) => line,
                None => break,
            };
            if line.trim_start().starts_with('#') {
                if columns.is_none() {
                    columns = parse_dmon_header(&line);
                }
                continue;
            }
            let cols = match columns.as_ref() {
                Some(cols) => cols,
                None => continue,
            };
            let row = match parse_dmon_row(cols, &line) {
                Some(row) => row,
                None => continue,
            };
            if row.gpu == 0 && !pending.is_empty() {
                if let Some(rates) = finalize_rates(&pending) {
                    publish(rates);
                }
                pending.clear();
            }
            pending.push(row);
        }

        clear_alive();
        let _ = child.kill();
        let _ = child.wait();
        if running.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_secs(1));
        }
    }
    clear_alive();
}
