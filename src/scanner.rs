//! Record boundary scanning
//!
//! Walks the input once and records the byte offset of the first tag line of
//! every game, without decoding anything. The boundary rules mirror
//! [`RecordReader`](crate::record::RecordReader) so that a chunk's declared
//! record count lines up with what a worker decodes from its start offset.

use log::debug;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::error::{ExtractError, Result};
use crate::record::{comment_state_after, is_tag_line};

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Scan a stream and return the start offset of every record, in file order
pub fn scan_offsets<R: BufRead>(mut reader: R) -> io::Result<Vec<u64>> {
    let mut offsets = Vec::new();
    let mut line = Vec::with_capacity(256);
    let mut position = 0u64;
    let mut in_headers = false;
    let mut in_comment = false;
    let mut first_line = true;

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line)?;
        if read == 0 {
            break;
        }

        let mut line_start = position;
        let mut content: &[u8] = &line;
        if first_line {
            first_line = false;
            if let Some(stripped) = content.strip_prefix(UTF8_BOM) {
                content = stripped;
                line_start += UTF8_BOM.len() as u64;
            }
        }
        position += read as u64;

        if !in_comment && is_tag_line(content) {
            if !in_headers {
                offsets.push(line_start);
                in_headers = true;
            }
            continue;
        }

        in_headers = false;
        if content.first() != Some(&b'%') {
            in_comment = comment_state_after(content, in_comment);
        }
    }

    Ok(offsets)
}

/// Open `path` and scan it for record offsets
pub fn scan_file(path: &Path) -> Result<Vec<u64>> {
    let file = File::open(path).map_err(|source| ExtractError::InputNotFound {
        path: path.to_path_buf(),
        source,
    })?;

    let offsets = scan_offsets(BufReader::with_capacity(1 << 16, file))?;
    debug!("Scanned '{}': {} record(s)", path.display(), offsets.len());
    Ok(offsets)
}
