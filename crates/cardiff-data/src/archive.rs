//! Row extraction over a whole accounts archive.
//!
//! Members are read sequentially from the ZIP and fanned out to the worker
//! pool; extracted rows come back in member order. A member that cannot be
//! read or whose name does not match the accounts convention is logged and
//! skipped; it never aborts the archive.

use std::io::{Read, Seek};

use cardiff_xbrl::{ExtractError, Row};
use zip::ZipArchive;

use crate::error::{DataError, Result};
use crate::pool;

/// Counters for one processed archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Documents successfully extracted (including ones yielding error rows).
    pub documents: usize,
    /// Rows emitted.
    pub rows: usize,
    /// Members skipped for unparseable filenames.
    pub skipped: usize,
}

/// Extract every member of an archive, handing rows to `on_row` in member
/// order (and period-descending order within each document).
pub fn extract_archive<R>(
    reader: R,
    workers: usize,
    mut on_row: impl FnMut(Row) -> Result<()>,
) -> Result<ArchiveSummary>
where
    R: Read + Seek + Send,
{
    let mut archive = ZipArchive::new(reader)?;
    let members = archive.len();

    let jobs = (0..members).filter_map(move |index| {
        let mut member = match archive.by_index(index) {
            Ok(member) => member,
            Err(err) => {
                log::warn!("skipping unreadable archive member #{index}: {err}");
                return None;
            }
        };
        if member.is_dir() {
            return None;
        }
        let name = member.name().to_string();
        let mut content = Vec::with_capacity(member.size() as usize);
        if let Err(err) = member.read_to_end(&mut content) {
            log::warn!("skipping truncated archive member {name}: {err}");
            return None;
        }
        Some((name, content))
    });

    let mut summary = ArchiveSummary::default();
    pool::map_ordered(
        jobs,
        workers,
        |(name, content): (String, Vec<u8>)| {
            let rows = cardiff_xbrl::document_to_rows(&name, &content);
            (name, rows)
        },
        |(name, rows): (String, std::result::Result<Vec<Row>, ExtractError>)| {
            match rows {
                Ok(rows) => {
                    summary.documents += 1;
                    for row in rows {
                        summary.rows += 1;
                        on_row(row)?;
                    }
                }
                Err(err) => {
                    log::warn!("skipping archive member {name}: {err}");
                    summary.skipped += 1;
                }
            }
            Ok::<(), DataError>(())
        },
    )?;
    Ok(summary)
}
