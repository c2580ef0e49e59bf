use chrono::{DateTime, Local};

use punt_types::ResourceSample;

/// Parse the fields of `/proc/<pid>/status` used for resource sampling.
///
/// Returns `None` unless all of `VmPeak`, `VmHWM`, `VmRSS` and `Threads`
/// are present; kernel threads and exited processes lack them.
pub fn parse_proc_status(
    pid: &str,
    status: &str,
    taken_at: DateTime<Local>,
) -> Option<ResourceSample> {
    let mut peak_kb = None;
    let mut hwm_kb = None;
    let mut rss_kb = None;
    let mut threads = None;

    for line in status.lines() {
        if let Some(v) = line.strip_prefix("VmPeak:") {
            peak_kb = parse_kb_value(v);
        } else if let Some(v) = line.strip_prefix("VmHWM:") {
            hwm_kb = parse_kb_value(v);
        } else if let Some(v) = line.strip_prefix("VmRSS:") {
            rss_kb = parse_kb_value(v);
        } else if let Some(v) = line.strip_prefix("Threads:") {
            threads = v.trim().parse().ok();
        }
    }

    Some(ResourceSample {
        pid: pid.to_string(),
        peak_kb: peak_kb?,
        hwm_kb: hwm_kb?,
        rss_kb: rss_kb?,
        threads: threads?,
        taken_at,
    })
}

/// "   123456 kB" -> 123456
fn parse_kb_value(v: &str) -> Option<u64> {
    v.split_whitespace().next()?.parse().ok()
}
