//! Human-readable error descriptions and structured JSON error formatting.

use scanrep_core::error::ScanError;

/// Stable name of the error class, used as the JSON `reason`.
pub fn error_class_name(err: &ScanError) -> &'static str {
    match err {
        ScanError::Transport(_) => "Transport",
        ScanError::Parse(_) => "Parse",
        ScanError::InvalidOperation(_) => "InvalidOperation",
        ScanError::Store(_) => "Store",
        ScanError::Config(_) => "Config",
        ScanError::Io(_) => "Io",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(se) = err.downcast_ref::<ScanError>() {
        return match se {
            ScanError::InvalidOperation(msg) => format!(
                "What happened: {msg}.\nLikely causes: The command does not apply in the current state (no scan running, nothing to undo, unknown patient label, or missing patient fields).\nHow to fix: Run `scanrep patients` to check labels, fill in every descriptor, then retry."
            ),
            ScanError::Transport(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("i2c") || lower.contains("0x36") || lower.contains("register") {
                    format!(
                        "What happened: Encoder read failed ({msg}).\nLikely causes: AS5600 not wired to the configured I2C bus, wrong address, or no power.\nHow to fix: Check [encoder] i2c_bus/address in the config and the SDA/SCL/3V3 wiring."
                    )
                } else if lower.contains("tty") || lower.contains("serial") || lower.contains("load cell") {
                    format!(
                        "What happened: Load cell link failed ({msg}).\nLikely causes: OpenScale unplugged, wrong port, or another process holds the port.\nHow to fix: Check [load_cell] port/baud in the config and reconnect the USB adapter."
                    )
                } else if lower.contains("gpio") || lower.contains("pin") {
                    format!(
                        "What happened: Button input failed ({msg}).\nLikely causes: Wrong BCM pin number or insufficient GPIO permissions.\nHow to fix: Fix [button] pin in the config; ensure the process may access /dev/gpiomem."
                    )
                } else {
                    format!(
                        "What happened: Device communication failed ({msg}).\nLikely causes: Loose cable or device not powered.\nHow to fix: Re-run `scanrep self-check` with --log-level=debug."
                    )
                }
            }
            ScanError::Parse(msg) => format!(
                "What happened: A device sent data that could not be parsed ({msg}).\nLikely causes: OpenScale not in continuous output mode or wrong baud rate.\nHow to fix: Open the board menu and enable `timestamp,value,unit` output at the configured baud."
            ),
            ScanError::Store(msg) => format!(
                "What happened: Patient data could not be read or written ({msg}).\nLikely causes: A hand-edited patients index, a missing data directory, or a full disk.\nHow to fix: Check [storage] paths in the config and the patients CSV contents."
            ),
            ScanError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML or config CSV.\nHow to fix: Edit the config file, then rerun."
            ),
            ScanError::Io(msg) => format!(
                "What happened: I/O error ({msg}).\nLikely causes: Insufficient permissions or resources.\nHow to fix: Re-run with --log-level=debug for details."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Map error classes to stable exit codes; anything untyped returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<ScanError>() {
        Some(ScanError::InvalidOperation(_)) => 3,
        Some(ScanError::Transport(_)) => 4,
        Some(ScanError::Parse(_)) => 5,
        Some(ScanError::Store(_)) => 6,
        Some(ScanError::Config(_)) => 7,
        Some(ScanError::Io(_)) | None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = err
        .downcast_ref::<ScanError>()
        .map_or("Error", error_class_name);
    json!({
        "reason": reason,
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
