//! User-visible notices.
//!
//! Each failure category has its own literal text. Notices about the
//! encryption layer itself go out in plain text, since encryption is what
//! failed.

use std::fmt::Display;

/// Inbound message was not encrypted for our device.
pub const NEW_OWN_KEY: &str =
    "NOTICE: NEW ENCRYPTION KEY DETECTED. REGISTERING NEW DEVICE IN KEYSTORE";

/// Inbound message uses a session we do not have. Sent encrypted.
pub const UNKNOWN_SESSION: &str = "ERROR: MESSAGE USES AN ENCRYPTED SESSION I DON'T KNOW ABOUT.";

/// The collaborator gave up on an inbound message.
pub const UNABLE_TO_DECRYPT: &str = "ERROR: UNABLE TO DECRYPT MESSAGE.";

/// The backend failed or answered in an unexpected shape.
pub const BACKEND_FAILURE: &str =
    "ERROR: THE TEXT GENERATION BACKEND RETURNED AN UNEXPECTED RESPONSE.";

/// Something unanticipated went wrong while handling a message.
pub const UNEXPECTED_FAILURE: &str =
    "ERROR: AN UNEXPECTED ERROR OCCURRED WHILE HANDLING YOUR MESSAGE.";

/// A sender device we have not seen before.
pub fn new_device(device: u32, jid: &str) -> String {
    format!(
        "NOTICE: NEW DEVICE \"{}\" DETECTED FOR ACCOUNT \"{}\". WELCOME, NEW OR RETURNING USER.",
        device, jid
    )
}

/// Unanticipated decryption failure.
pub fn decryption_exception(err: impl Display) -> String {
    format!("ERROR: EXCEPTION OCCURRED WHILE ATTEMPTING DECRYPTION.\n{}", err)
}

/// A recipient device without keys is skipped for this delivery.
pub fn missing_keys(device: u32, jid: &str) -> String {
    format!(
        "Could not find keys for device \"{}\" of recipient \"{}\". Skipping.",
        device, jid
    )
}

/// Recipient lookup failed on the wire.
pub fn recipient_lookup_failed(err: impl Display) -> String {
    format!(
        "An error occurred while fetching information on a recipient.\n{}",
        err
    )
}

/// Unanticipated encryption failure.
pub fn encryption_failed(err: impl Display) -> String {
    format!("An error occurred while attempting to encrypt.\n{}", err)
}
