//! Framing: `<filename>|<size>` text header, then exactly `size` raw payload bytes.
//! One connection carries one file. The header has no length prefix; the receiver
//! reads at most `HEADER_BUF_LEN` bytes and splits on the first `'|'`.

const DELIMITER: u8 = b'|';
const MAX_SIZE_DIGITS: usize = 20; // u64::MAX has 20 decimal digits

/// Receiver reads the header with a single read into a buffer of this size.
pub const HEADER_BUF_LEN: usize = 1024;
/// Payload is written and read in chunks of at most this many bytes.
pub const CHUNK_SIZE: usize = 4096;

/// Filename and payload size announced before the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    pub filename: String,
    pub size: u64,
}

impl TransferHeader {
    /// Build a header, rejecting names the receiver could not parse or store.
    pub fn new(filename: impl Into<String>, size: u64) -> Result<Self, HeaderError> {
        let filename = filename.into();
        if filename.as_bytes().contains(&DELIMITER) {
            return Err(HeaderError::DelimiterInName(filename));
        }
        check_name(&filename)?;
        Ok(Self { filename, size })
    }
}

/// Encode the header as a single UTF-8 text message.
pub fn encode_header(header: &TransferHeader) -> Result<Vec<u8>, HeaderError> {
    if header.filename.as_bytes().contains(&DELIMITER) {
        return Err(HeaderError::DelimiterInName(header.filename.clone()));
    }
    let out = format!("{}|{}", header.filename, header.size).into_bytes();
    if out.len() > HEADER_BUF_LEN {
        return Err(HeaderError::TooLong(out.len()));
    }
    Ok(out)
}

/// Decode a header from the first read of a connection. Returns the header and the
/// number of bytes consumed; anything after that is the start of the payload.
pub fn decode_header(bytes: &[u8]) -> Result<(TransferHeader, usize), HeaderError> {
    let bytes = &bytes[..bytes.len().min(HEADER_BUF_LEN)];
    let split = bytes
        .iter()
        .position(|&b| b == DELIMITER)
        .ok_or(HeaderError::MissingDelimiter)?;
    let filename = std::str::from_utf8(&bytes[..split]).map_err(|_| HeaderError::InvalidUtf8)?;
    check_name(filename)?;

    let rest = &bytes[split + 1..];
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || digits > MAX_SIZE_DIGITS {
        return Err(HeaderError::InvalidSize(preview(rest)));
    }
    // digits are ASCII, so this slice is valid UTF-8
    let size = std::str::from_utf8(&rest[..digits])
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| HeaderError::InvalidSize(preview(rest)))?;

    Ok((
        TransferHeader {
            filename: filename.to_string(),
            size,
        },
        split + 1 + digits,
    ))
}

fn check_name(name: &str) -> Result<(), HeaderError> {
    let unsafe_name = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(HeaderError::UnsafeName(name.to_string()));
    }
    Ok(())
}

fn preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(32)]).into_owned()
}

/// Error encoding or decoding a transfer header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("header has no '|' delimiter")]
    MissingDelimiter,
    #[error("filename {0:?} contains the '|' delimiter")]
    DelimiterInName(String),
    #[error("filename is not valid UTF-8")]
    InvalidUtf8,
    #[error("filename {0:?} is not a plain file name")]
    UnsafeName(String),
    #[error("invalid size field {0:?}")]
    InvalidSize(String),
    #[error("header of {0} bytes exceeds the receive buffer")]
    TooLong(usize),
}
