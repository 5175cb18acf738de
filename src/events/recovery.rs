//! Event log recovery
//!
//! Rebuilds indexes by scanning the log from offset 0. The scan stops at the
//! first zero `data_length` (end of written data), at physical EOF, or at the
//! first record that fails to decode or checksum. Everything before the stop
//! point is kept; a torn tail is reported, not raised.

use std::fs;
use std::path::Path;

use crate::cancel::CancellationToken;
use crate::codec::{decode_header, peek_data_length, EventHeader, EVENT_HEADER_SIZE};
use crate::error::Result;

/// Result of a recovery scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Number of complete, checksummed events found
    pub events_recovered: u64,

    /// Highest sequence among recovered events
    pub last_sequence: u64,

    /// Offset just past the last recovered event (next append position)
    pub end_position: u64,

    /// Whether the scan stopped at a partial or corrupt record
    pub was_truncated: bool,
}

/// Scan `log` and hand each valid record to `visit` in file order
pub(crate) fn scan<F>(log: &[u8], cancel: &CancellationToken, mut visit: F) -> Result<RecoveryReport>
where
    F: FnMut(u64, &EventHeader),
{
    let mut report = RecoveryReport::default();
    let mut position = 0usize;
    let header_len = EVENT_HEADER_SIZE;

    loop {
        cancel.check()?;

        let Some(header_bytes) = log.get(position..position + header_len) else {
            if position < log.len() {
                report.was_truncated = true;
            }
            break;
        };

        match peek_data_length(header_bytes) {
            Some(0) | None => break,
            Some(_) => {}
        }

        let header = match decode_header(header_bytes) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!(position, error = %e, "stopping scan at undecodable header");
                report.was_truncated = true;
                break;
            }
        };

        let payload_start = position + header_len;
        let payload_end = payload_start + header.data_length as usize;
        let Some(payload) = log.get(payload_start..payload_end) else {
            tracing::warn!(position, "stopping scan at record running past end of file");
            report.was_truncated = true;
            break;
        };

        if let Err(e) = header.verify_payload(payload) {
            tracing::warn!(position, error = %e, "stopping scan at torn record");
            report.was_truncated = true;
            break;
        }

        visit(position as u64, &header);
        report.events_recovered += 1;
        report.last_sequence = report.last_sequence.max(header.sequence);
        position = payload_end;
    }

    report.end_position = position as u64;
    Ok(report)
}

/// Verify an event log without opening it for writing
pub fn verify(path: &Path) -> Result<RecoveryReport> {
    let log = fs::read(path)?;
    scan(&log, &CancellationToken::new(), |_, _| {})
}
