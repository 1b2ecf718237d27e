use crate::error::ValidationError;

/// Longest filename accepted for upload or share.
pub const MAX_FILENAME_LEN: usize = 50;

/// Accept `^[A-Za-z0-9.]{1,50}$`, minus `.` and anything containing `..`.
///
/// Anything with a separator or traversal segment is refused here, before it
/// can reach the registry or the blob directory.
pub fn validate_filename(filename: &str) -> Result<(), ValidationError> {
    let ok = !filename.is_empty()
        && filename.len() <= MAX_FILENAME_LEN
        && filename.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
        && filename != "."
        && !filename.contains("..");
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidFilename(filename.to_string()))
    }
}
