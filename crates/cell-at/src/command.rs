//! AT command text
//!
//! Command prefixes are passed to [`AtSession::cmd_start`](crate::AtSession::cmd_start)
//! verbatim; parameters are appended with the session's `write_*` calls.

/// Readiness probe
pub const AT: &str = "AT";

/// SIM status query: `AT+CPIN?`
pub const CPIN_QUERY: &str = "AT+CPIN?";

/// PIN entry: `AT+CPIN=<pin>`
pub const CPIN_SET: &str = "AT+CPIN=";

/// Prefix of the SIM status information line
pub const CPIN_RESPONSE: &str = "+CPIN:";

/// Power saving mode settings: `AT+CPSMS=<mode>[,...]`
pub const CPSMS_SET: &str = "AT+CPSMS=";

/// Manufacturer identification
pub const CGMI: &str = "AT+CGMI";

/// Model identification
pub const CGMM: &str = "AT+CGMM";

/// Revision identification
pub const CGMR: &str = "AT+CGMR";

/// Product serial number (IMEI)
pub const CGSN: &str = "AT+CGSN";

/// Command line terminator
pub const TERMINATOR: &str = "\r";

/// Final result code for success
pub const OK: &str = "OK";

/// Final result code for a generic failure
pub const ERROR: &str = "ERROR";

/// Prefix of an extended mobile equipment error
pub const CME_ERROR: &str = "+CME ERROR:";

/// Prefix of an extended message service error
pub const CMS_ERROR: &str = "+CMS ERROR:";
