//! Whole-file replacement that readers never observe half-written.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to a sibling temp file, fsync it, then rename over `path`.
///
/// Temp names carry the pid and a process-wide counter so concurrent writers
/// of the same target never share a temp file.
///
/// # Errors
///
/// Returns [`Error::Storage`] if the parent directory cannot be created or
/// any step of the write/rename fails. The temp file is removed on failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| Error::storage(parent, err))?;

    let tmp = temp_path_for(path);
    let written = File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, path));

    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(Error::storage(path, err));
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_name()
        .map_or_else(|| "warden".into(), |name| name.to_string_lossy());
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{stem}.{}.{seq}.tmp", std::process::id()))
}

/// Percent-encode a worker name so it is safe as a single path component.
pub(crate) fn encode_file_stem(name: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut encoded = String::with_capacity(name.len());

    for byte in name.bytes() {
        let is_safe = byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_';
        if is_safe {
            encoded.push(char::from(byte));
        } else {
            encoded.push('%');
            encoded.push(char::from(HEX[usize::from(byte >> 4)]));
            encoded.push(char::from(HEX[usize::from(byte & 0x0F)]));
        }
    }

    encoded
}

/// Inverse of [`encode_file_stem`]; `None` for malformed escapes.
pub(crate) fn decode_file_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' {
            let hex = stem.get(idx + 1..idx + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            idx += 3;
        } else {
            out.push(bytes[idx]);
            idx += 1;
        }
    }
    String::from_utf8(out).ok()
}
