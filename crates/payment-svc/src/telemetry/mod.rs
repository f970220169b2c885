//! Structured logging and optional OpenTelemetry span export.
//!
//! Logs are JSON lines on stdout. Spans are exported via OTLP/gRPC only when
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is configured.
//!
//! # Telemetry invariants
//!
//! - **No plaintext sensitive field and no key material** may appear in any
//!   span attribute or log field. Records are identified by id, keys by a
//!   short fingerprint of their wrapped form.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`).

pub mod init;

pub use init::{init_telemetry, shutdown_telemetry};
