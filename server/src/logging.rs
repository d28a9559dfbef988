//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberschreibt die Konfiguration):
//! - `KLATSCH_LOG_LEVEL`: Filter-Direktive (z.B. `debug` oder
//!   `info,klatsch_relay=trace`)
//! - `KLATSCH_LOG_FORMAT`: Format (text/json)

use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Filter
pub const ENV_LOG_LEVEL: &str = "KLATSCH_LOG_LEVEL";

/// Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "KLATSCH_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// `KLATSCH_LOG_LEVEL` und `KLATSCH_LOG_FORMAT` haben Vorrang vor den
/// uebergebenen Werten. Faellt auf `info` zurueck wenn der Filter ungueltig
/// ist.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format_env = std::env::var(ENV_LOG_FORMAT).ok();

    match format_waehlen(format_env.as_deref(), format) {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Waehlt das Format: gueltiger Umgebungswert vor Konfiguration
pub fn format_waehlen<'a>(aus_env: Option<&'a str>, aus_config: &'a str) -> &'a str {
    match aus_env {
        Some(format) if log_format_gueltig(format) => format,
        _ => aus_config,
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
