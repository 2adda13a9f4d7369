//! The Gemini status-code taxonomy: numeric codes 10-69 grouped by leading digit.

/// A raw two-digit Gemini status code. Kept as a plain `u8` (not an enum) because the
/// protocol lets a handler emit any code in its class, not just the named ones below.
pub type Status = u8;

pub const INPUT: Status = 10;
pub const SENSITIVE_INPUT: Status = 11;
pub const SUCCESS: Status = 20;
pub const REDIRECT_TEMPORARY: Status = 30;
pub const REDIRECT_PERMANENT: Status = 31;
pub const TEMPORARY_FAILURE: Status = 40;
pub const SERVER_UNAVAILABLE: Status = 41;
pub const CGI_ERROR: Status = 42;
pub const PROXY_ERROR: Status = 43;
pub const SLOW_DOWN: Status = 44;
pub const PERMANENT_FAILURE: Status = 50;
pub const NOT_FOUND: Status = 51;
pub const GONE: Status = 52;
pub const PROXY_REQUEST_REFUSED: Status = 53;
pub const BAD_REQUEST: Status = 59;
pub const CLIENT_CERTIFICATE_REQUIRED: Status = 60;
pub const CERTIFICATE_NOT_AUTHORIZED: Status = 61;
pub const CERTIFICATE_NOT_VALID: Status = 62;

pub fn is_input(status: Status) -> bool {
    (10..20).contains(&status)
}

pub fn is_success(status: Status) -> bool {
    (20..30).contains(&status)
}

pub fn is_redirect(status: Status) -> bool {
    (30..40).contains(&status)
}

pub fn is_temporary_failure(status: Status) -> bool {
    (40..50).contains(&status)
}

pub fn is_permanent_failure(status: Status) -> bool {
    (50..60).contains(&status)
}

pub fn is_cert_required(status: Status) -> bool {
    (60..70).contains(&status)
}

/// `true` for any status class considered a failure (`>= 40`).
pub fn is_error(status: Status) -> bool {
    (40..70).contains(&status)
}

pub fn is_valid(status: Status) -> bool {
    (10..70).contains(&status)
}

/// Human-readable category name, `"UNKNOWN"` outside `10..=69`.
pub fn interpret(status: Status) -> &'static str {
    if is_input(status) {
        "INPUT"
    } else if is_success(status) {
        "SUCCESS"
    } else if is_redirect(status) {
        "REDIRECT"
    } else if is_temporary_failure(status) {
        "TEMPORARY FAILURE"
    } else if is_permanent_failure(status) {
        "PERMANENT FAILURE"
    } else if is_cert_required(status) {
        "CLIENT CERTIFICATE REQUIRED"
    } else {
        "UNKNOWN"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_mutually_exclusive() {
        for status in 10..=69u8 {
            let flags = [
                is_input(status),
                is_success(status),
                is_redirect(status),
                is_error(status),
            ];
            assert_eq!(
                flags.iter().filter(|b| **b).count(),
                1,
                "status {status} matched {flags:?}"
            );
        }
    }

    #[test]
    fn unknown_outside_range() {
        assert_eq!(interpret(9), "UNKNOWN");
        assert_eq!(interpret(70), "UNKNOWN");
        assert!(!is_valid(9));
        assert!(!is_valid(70));
    }

    #[test]
    fn named_constants_land_in_expected_classes() {
        assert!(is_temporary_failure(SLOW_DOWN));
        assert!(is_permanent_failure(NOT_FOUND));
        assert!(is_permanent_failure(PROXY_REQUEST_REFUSED));
        assert!(is_permanent_failure(BAD_REQUEST));
        assert!(is_cert_required(CLIENT_CERTIFICATE_REQUIRED));
    }
}
