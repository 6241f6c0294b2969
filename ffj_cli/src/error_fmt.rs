//! Human-readable error descriptions and structured JSON error formatting.

use ffj_core::FfjError;

pub fn reason_name(e: &FfjError) -> &'static str {
    match e {
        FfjError::Hardware(_) => "Hardware",
        FfjError::HardwareFault(_) => "HardwareFault",
        FfjError::SensorUnavailable => "SensorUnavailable",
        FfjError::Cancelled => "Cancelled",
        FfjError::NotHomed(_) => "NotHomed",
        FfjError::Persist(_) => "Persist",
        FfjError::Config(_) => "Config",
        FfjError::State(_) => "State",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(fe) = err.downcast_ref::<FfjError>() {
        return match fe {
            FfjError::Cancelled => "What happened: The run was stopped by the interlock.\nLikely causes: Ctrl-C or the emergency stop input.\nHow to fix: Clear the cause; `ffj resume` continues from the last completed stage. The interrupted stage runs again from the start.".to_string(),
            FfjError::SensorUnavailable => "What happened: The weight sensor did not deliver a reading.\nLikely causes: HX711 not wired correctly, no power/ground, or scale.read_timeout_ms too low.\nHow to fix: Verify the hx711_dt/hx711_sck pins and power, and consider increasing scale.read_timeout_ms in the config.".to_string(),
            FfjError::NotHomed(axis) => format!(
                "What happened: The {axis} axis was asked to move to a station before it was homed.\nLikely causes: A previous motion was interrupted, which drops the home reference.\nHow to fix: Run `ffj home`, then retry."
            ),
            FfjError::Persist(msg) => format!(
                "What happened: The progress file could not be read or written ({msg}).\nLikely causes: Wrong state.path, a read-only or full filesystem, or a file written by another version.\nHow to fix: Check state.path in the config. If the file is damaged, inspect it and run `ffj reset --yes` to start over."
            ),
            FfjError::Config(msg) => format!(
                "What happened: Invalid input ({msg}).\nLikely causes: A typo in a stage name or config value.\nHow to fix: Stage names are banana-added, molasses-added, mixed, sealed, fermenting."
            ),
            FfjError::State(msg) => format!(
                "What happened: The request does not fit the current progress ({msg}).\nLikely causes: A stage is still running, or stages were requested out of order.\nHow to fix: Run `ffj status` to see what is recorded."
            ),
            FfjError::Hardware(msg) | FfjError::HardwareFault(msg) => format!(
                "What happened: A hardware line failed ({msg}).\nLikely causes: GPIO permissions, a wrong pin number, or a loose connection.\nHow to fix: Check the [pins] section and wiring, then run `ffj self-check`."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open hx711") || lower.contains("open gpio") || lower.contains("(gpio ") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("invalid configuration") || lower.contains("parse config") {
        let cause = err
            .chain()
            .nth(1)
            .map(ToString::to_string)
            .unwrap_or_default();
        return format!(
            "What happened: Configuration is invalid ({cause}).\nLikely causes: Out-of-range values, duplicate pins, or a TOML type error.\nHow to fix: Edit the TOML config and try again."
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

/// Stable exit codes per error kind; anything untyped returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<FfjError>() {
        Some(FfjError::Cancelled) => 2,
        Some(FfjError::SensorUnavailable) => 3,
        Some(FfjError::Persist(_)) => 4,
        Some(FfjError::NotHomed(_)) => 5,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = err
        .downcast_ref::<FfjError>()
        .map_or("Error", reason_name);
    json!({
        "reason": reason,
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
        "error": format!("{err:#}"),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    fn wrapped(e: FfjError) -> eyre::Report {
        Err::<(), _>(e).wrap_err("advance mixed").unwrap_err()
    }

    #[test]
    fn exit_codes_survive_context() {
        assert_eq!(exit_code_for_error(&wrapped(FfjError::Cancelled)), 2);
        assert_eq!(exit_code_for_error(&wrapped(FfjError::SensorUnavailable)), 3);
        assert_eq!(exit_code_for_error(&wrapped(FfjError::Persist("x".into()))), 4);
        assert_eq!(exit_code_for_error(&wrapped(FfjError::NotHomed("slider"))), 5);
        assert_eq!(exit_code_for_error(&eyre::eyre!("boom")), 1);
    }

    #[test]
    fn json_error_names_the_reason() {
        let v: serde_json::Value =
            serde_json::from_str(&format_error_json(&wrapped(FfjError::Cancelled))).unwrap();
        assert_eq!(v["reason"], "Cancelled");
        assert_eq!(v["exit_code"], 2);
        assert!(v["message"].as_str().unwrap().starts_with("What happened"));
    }

    #[test]
    fn config_errors_show_the_cause() {
        let err = Err::<(), _>(eyre::eyre!("dosing.samples must be >= 1"))
            .wrap_err("invalid configuration")
            .unwrap_err();
        let text = humanize(&err);
        assert!(text.contains("dosing.samples must be >= 1"), "{text}");
    }
}
