use crate::error::QueryError;

/// Separator between the wallet address and the rig name in a worker key.
pub const WORKER_SEPARATOR: char = '.';

/// Reduce `address` or `address.rig` to the wallet address that owns it.
pub fn normalize_address(raw: &str) -> Result<&str, QueryError> {
    match raw.split(WORKER_SEPARATOR).next() {
        Some(address) if !address.is_empty() => Ok(address),
        _ => Err(QueryError::InvalidAddress),
    }
}

/// Pull the wallet address out of a request query string (`?t1abc.rig1`).
///
/// `None` means the request had no `?` at all. Only the text up to a further
/// `?` is considered.
pub fn parse_query_address(query: Option<&str>) -> Result<&str, QueryError> {
    let query = query.ok_or(QueryError::MissingQueryString)?;
    let raw = query.split('?').next().unwrap_or_default();
    if raw.is_empty() {
        return Err(QueryError::MissingAddress);
    }
    normalize_address(raw)
}
