/// Readers for per-process counters under `/proc/<pid>/`.
///
/// Every reader returns `None` when the file is gone or malformed, which is
/// what happens when the process exits between two reads.
use nix::unistd::{sysconf, SysconfVar};
use std::sync::LazyLock;

/// Fallback when `sysconf(_SC_CLK_TCK)` is unavailable.
const DEFAULT_CLOCK_TICKS: u64 = 100;

static CLOCK_TICKS_PER_SEC: LazyLock<u64> = LazyLock::new(|| {
    match sysconf(SysconfVar::CLK_TCK) {
        Ok(Some(ticks)) if ticks > 0 => ticks as u64,
        _ => DEFAULT_CLOCK_TICKS,
    }
});

/// Resident set size of `pid`, in bytes.
pub fn rss_bytes(pid: u32) -> Option<u64> {
    let text = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    parse_vm_rss(&text)
}

/// User plus system CPU time consumed by `pid`, in milliseconds.
pub fn cpu_time_ms(pid: u32) -> Option<f64> {
    let text = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let ticks = parse_cpu_ticks(&text)?;
    Some(ticks as f64 * 1000.0 / *CLOCK_TICKS_PER_SEC as f64)
}

/// Extract `VmRSS` (reported in kB) from the contents of `/proc/<pid>/status`.
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kb.saturating_mul(1024))
}

/// Extract `utime + stime` (clock ticks) from the contents of `/proc/<pid>/stat`.
///
/// The command name in field 2 may contain spaces and parentheses, so fields
/// are counted from the last `)`.
fn parse_cpu_ticks(stat: &str) -> Option<u64> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    // rest starts at field 3 (state); utime and stime are fields 14 and 15
    let utime: u64 = fields.nth(11)?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(utime.saturating_add(stime))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "4242 (my prog) S 1 4242 4242 0 -1 4194560 120 0 0 0 37 5 0 0 20 0 1 0 1234567 10485760 512 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 3 0 0 0 0 0";

    #[test]
    fn test_parse_cpu_ticks() {
        assert_eq!(parse_cpu_ticks(STAT), Some(42));
    }

    #[test]
    fn test_parse_cpu_ticks_with_parens_in_name() {
        let stat = STAT.replace("(my prog)", "(weird) (name))");
        assert_eq!(parse_cpu_ticks(&stat), Some(42));
    }

    #[test]
    fn test_parse_cpu_ticks_truncated() {
        assert_eq!(parse_cpu_ticks("4242 (sh) S 1 2 3"), None);
        assert_eq!(parse_cpu_ticks("garbage"), None);
    }

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tsh\nState:\tS (sleeping)\nVmPeak:\t    2500 kB\nVmRSS:\t     900 kB\nThreads:\t1\n";
        assert_eq!(parse_vm_rss(status), Some(900 * 1024));
    }

    #[test]
    fn test_parse_vm_rss_missing_for_zombie() {
        let status = "Name:\tsh\nState:\tZ (zombie)\nThreads:\t1\n";
        assert_eq!(parse_vm_rss(status), None);
    }

    #[test]
    fn test_own_process_counters_are_readable() {
        let pid = std::process::id();
        assert!(rss_bytes(pid).unwrap() > 0);
        assert!(cpu_time_ms(pid).unwrap() >= 0.0);
    }

    #[test]
    fn test_vanished_process_reads_none() {
        // pid_max never reaches this value
        assert_eq!(rss_bytes(u32::MAX), None);
        assert_eq!(cpu_time_ms(u32::MAX), None);
    }
}
