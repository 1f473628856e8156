//! Human-readable error descriptions, exit codes and structured JSON errors.

use loadcell_core::error::{BuildError, ScaleError, StoreError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(se) = err.downcast_ref::<ScaleError>() {
        return match se {
            ScaleError::Timeout => "What happened: Scale read timed out.\nLikely causes: HX711 not wired correctly, no power/ground, or read timeout too low.\nHow to fix: Verify DOUT/SCK pins and power, and consider increasing read_timeout_ms for the channel.".to_string(),
            ScaleError::Disconnected => "What happened: The sample source went away.\nLikely causes: Reader stopped or the device was unplugged.\nHow to fix: Check the wiring and restart.".to_string(),
            ScaleError::InvalidInput(msg) => format!(
                "What happened: Invalid input ({msg}).\nLikely causes: Non-positive calibration weight, or no weight on the cell when calibrating.\nHow to fix: Tare with the cell empty, place a known weight, and pass its mass with --grams."
            ),
            ScaleError::NoFreeStateMachine => "What happened: No free state machine for another channel.\nLikely causes: Too many channels configured.\nHow to fix: Use at most 4 FIFO-fed channels.".to_string(),
            ScaleError::Hardware(msg) | ScaleError::HardwareFault(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: GPIO access or wiring problem.\nHow to fix: Check the [[channel]] pins and GPIO permissions."
            ),
        };
    }

    if let Some(st) = err.downcast_ref::<StoreError>() {
        return match st {
            StoreError::VerifyFailed => "What happened: Calibration record did not read back correctly.\nLikely causes: Worn or write-protected flash, or a full disk for the image file.\nHow to fix: Run `loadcell erase-config` and calibrate again; replace storage if it keeps failing.".to_string(),
            StoreError::Storage(msg) => format!(
                "What happened: Storage error ({msg}).\nLikely causes: Image file path not writable.\nHow to fix: Check [storage].path and its directory permissions."
            ),
            StoreError::Geometry(msg) => format!(
                "What happened: Storage geometry unusable ({msg}).\nLikely causes: sector_size or capacity misconfigured.\nHow to fix: Fix [storage] in the config."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            BuildError::MissingSource => "What happened: Channel has no sample source.\nHow to fix: This is a bug in the caller; please report it.".to_string(),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open hx711") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [[channel]] dout/sck values; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("unknown channel") {
        return format!(
            "What happened: {msg}.\nHow to fix: Pass a configured channel name or its index (0, 1, 2)."
        );
    }

    if lower.contains("config") {
        let mut cause = String::new();
        if let Some(src) = err.source() {
            cause = format!(" Cause: {src}");
        }
        return format!(
            "What happened: Configuration is invalid or unreadable ({msg}).{cause}\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error class; anything unclassified is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(se) = err.downcast_ref::<ScaleError>() {
        return match se {
            ScaleError::Timeout => 3,
            ScaleError::InvalidInput(_) => 4,
            ScaleError::Disconnected
            | ScaleError::NoFreeStateMachine
            | ScaleError::Hardware(_)
            | ScaleError::HardwareFault(_) => 6,
        };
    }
    if err.downcast_ref::<StoreError>().is_some() {
        return 5;
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return 7;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(se) = err.downcast_ref::<ScaleError>() {
        return match se {
            ScaleError::Timeout => "Timeout",
            ScaleError::InvalidInput(_) => "InvalidInput",
            ScaleError::Disconnected => "Disconnected",
            ScaleError::NoFreeStateMachine => "NoFreeStateMachine",
            ScaleError::Hardware(_) | ScaleError::HardwareFault(_) => "Hardware",
        };
    }
    if let Some(st) = err.downcast_ref::<StoreError>() {
        return match st {
            StoreError::VerifyFailed => "VerifyFailed",
            StoreError::Storage(_) | StoreError::Geometry(_) => "Storage",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Config";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    fn wrapped(e: ScaleError) -> eyre::Report {
        Err::<(), _>(e).wrap_err("tare channel 'a'").unwrap_err()
    }

    #[test]
    fn typed_errors_survive_context() {
        let err = wrapped(ScaleError::Timeout);
        assert_eq!(exit_code_for_error(&err), 3);
        assert!(humanize(&err).contains("timed out"));
    }

    #[test]
    fn json_error_shape() {
        let err = wrapped(ScaleError::InvalidInput("known weight must be positive"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "InvalidInput");
        assert_eq!(v["code"], 4);
        assert!(v["message"].as_str().unwrap().contains("known weight"));
    }

    #[test]
    fn store_errors_map_to_five() {
        let err = eyre::Report::new(StoreError::VerifyFailed);
        assert_eq!(exit_code_for_error(&err), 5);
        assert_eq!(reason_name(&err), "VerifyFailed");
    }

    #[test]
    fn unknown_errors_fall_back() {
        let err = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(humanize(&err).contains("Original: boom"));
    }
}
