//! The numeric status taxonomy.

/// Success codes treated as such by clients.
pub const OK: u16 = 200;
pub const NO_CHANGE: u16 = 201;

/// The canonical status text for a response code.
///
/// Codes are surfaced verbatim in the `code`/`status` response headers.
pub fn canonical_status(code: u16) -> &'static str {
    match code {
        // 2xx Success.
        200 => "Ok",
        201 => "No change",
        202 => "Decline",

        // 3xx Partial success.
        300 => "Deprecated request type",
        301 => "Redirect",
        302 => "Retry",

        // 4xx Client error.
        400 => "Malformed data",
        401 => "Unsupported encoding",
        420 => "Server temporarily unavailable",
        430 => "Access denied",
        431 => "Account suspended",
        432 => "Account terminated",

        // 5xx Server error.
        500 => "Syntax error in request",
        501 => "Syntax error, illegal parameters",
        502 => "Not implemented",
        503 => "Command parameter not implemented",
        504 => "Request too big",

        _ => "[Missing error code]",
    }
}
