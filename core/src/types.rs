//! Shared primitive types used across the entire engine.

/// A reporting year. Snapshots arrive as discrete yearly batches.
pub type Year = i32;

/// Opaque, stable identifier for an institution (e.g. a regulator-assigned
/// certificate number). Constant across years.
pub type InstitutionId = String;
