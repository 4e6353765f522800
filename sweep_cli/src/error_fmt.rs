//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes
/// and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use sweep_core::{BuildError, SweepError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingPlan => {
                "What happened: No sweep plan reached the engine.\nHow to fix: This is a wiring bug in the CLI; please report it.".to_string()
            }
            BuildError::MissingSource => {
                "What happened: No source-meter was provided to the engine.\nLikely causes: Instrument failed to initialize.\nHow to fix: Check the source-meter connection and the [addresses] config.".to_string()
            }
            BuildError::MissingSink => {
                "What happened: No data sink was provided to the engine.\nLikely causes: The data file could not be created.\nHow to fix: Check the --out path and its permissions.".to_string()
            }
            BuildError::MissingCryostat => {
                "What happened: The plan needs the temperature controller but none was wired in.\nHow to fix: Configure addresses.cryostat or pick a plan that does not sweep temperature.".to_string()
            }
            BuildError::MissingMagnet => {
                "What happened: The plan drives the field but no magnet supply was wired in.\nHow to fix: Configure addresses.magnet or pick a plan that does not drive the field.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid plan or configuration ({msg}).\nLikely causes: A parameter outside the rig limits in [limits].\nHow to fix: Adjust the command-line parameters or the config, then rerun."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<SweepError>() {
        if matches!(se, SweepError::Timeout) {
            return "What happened: An instrument did not answer in time.\nLikely causes: GPIB cabling, a powered-off instrument, or a hung bus.\nHow to fix: Check the rig, then rerun. The outputs were driven to a safe state.".to_string();
        }
        if let SweepError::Config(msg) = se {
            return format!(
                "What happened: {msg}.\nHow to fix: Adjust the command-line parameters or the config, then rerun."
            );
        }
        return format!(
            "What happened: {se}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("field schedule csv must have header") {
        return "Invalid header in field schedule CSV. Expected 'field_t'.".to_string();
    }

    if lower.contains("create data file") {
        return "What happened: The data file could not be created.\nLikely causes: Missing directory or insufficient permissions at the --out path.\nHow to fix: Point --out at a writable location.".to_string();
    }

    if lower.contains("is not a gpib resource") || lower.contains("must be") {
        return format!(
            "What happened: Configuration is invalid.\nHow to fix: Edit the TOML config and try again. Original: {msg}"
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

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    use sweep_core::BuildError;

    let reason = if err.downcast_ref::<BuildError>().is_some() {
        "InvalidPlan"
    } else {
        "Error"
    };
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}
