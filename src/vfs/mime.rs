//! MIME lookup, data URLs and permission strings

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::MimeConfig;
use crate::error::{Result, WebdeskError};

/// Extension based MIME table
#[derive(Debug, Clone)]
pub struct MimeTable {
    config: MimeConfig,
}

impl MimeTable {
    pub fn new(config: MimeConfig) -> Self {
        Self { config }
    }

    /// MIME type for a file name (or path); falls back to the default
    pub fn get(&self, filename: &str) -> &str {
        let basename = filename.rsplit('/').next().unwrap_or(filename);
        basename
            .rfind('.')
            .and_then(|idx| self.config.types.get(&basename[idx..].to_lowercase()))
            .map(String::as_str)
            .unwrap_or(&self.config.default)
    }
}

/// `data:<mime>;base64,<payload>`
pub fn data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(data))
}

/// Decode a base64 data URL into its MIME type and payload
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| WebdeskError::InvalidArgument("not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| WebdeskError::InvalidArgument("malformed data URL".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| WebdeskError::InvalidArgument("data URL is not base64".to_string()))?;

    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| WebdeskError::InvalidArgument(format!("bad base64 payload: {}", e)))?;
    Ok((mime.to_string(), bytes))
}

/// Render a unix mode as `drwxr-xr-x`
pub fn permission_to_string(mode: u32) -> String {
    let kind = match mode & libc::S_IFMT as u32 {
        m if m == libc::S_IFSOCK as u32 => 's',
        m if m == libc::S_IFLNK as u32 => 'l',
        m if m == libc::S_IFREG as u32 => '-',
        m if m == libc::S_IFBLK as u32 => 'b',
        m if m == libc::S_IFDIR as u32 => 'd',
        m if m == libc::S_IFIFO as u32 => 'p',
        m if m == libc::S_IFCHR as u32 => 'c',
        _ => 'u',
    };

    let bit = |mask: u32, c: char| if mode & mask != 0 { c } else { '-' };
    // execute slot doubling as setuid/setgid/sticky
    let special = |exec: u32, flag: u32, set: char, unset: char| {
        match (mode & exec != 0, mode & flag != 0) {
            (true, true) => set,
            (false, true) => unset,
            (true, false) => 'x',
            (false, false) => '-',
        }
    };

    let mut out = String::with_capacity(10);
    out.push(kind);
    out.push(bit(0o400, 'r'));
    out.push(bit(0o200, 'w'));
    out.push(special(0o100, 0o4000, 's', 'S'));
    out.push(bit(0o040, 'r'));
    out.push(bit(0o020, 'w'));
    out.push(special(0o010, 0o2000, 's', 'S'));
    out.push(bit(0o004, 'r'));
    out.push(bit(0o002, 'w'));
    out.push(special(0o001, 0o1000, 't', 'T'));
    out
}
