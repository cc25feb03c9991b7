// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Certification status and the eligibility predicate.
//!
//! Persistence layers store status as free-form strings. [`VerificationStatus::parse`]
//! is the only place those strings are interpreted, and
//! [`TrackRecord::is_eligible`](crate::storage::traits::TrackRecord::is_eligible)
//! is the only rule deciding whether a leaf enters the next rebuild.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized certification outcome for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Passed human-origin review; leaf may be included
    Certified,
    /// Failed review (e.g. flagged as AI-generated)
    Rejected,
    /// Not reviewed yet, or status unrecognized
    #[default]
    Pending,
}

impl VerificationStatus {
    /// Interpret a stored status string.
    ///
    /// Trimmed and case-insensitive. Unrecognized values are `Pending`, never
    /// `Certified`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" | "verified" | "certified" | "1" => Self::Certified,
            "no" | "false" | "ai" | "rejected" | "0" => Self::Rejected,
            _ => Self::Pending,
        }
    }

    /// Same as [`parse`](Self::parse), treating a missing value as `Pending`.
    pub fn parse_opt(raw: Option<&str>) -> Self {
        raw.map(Self::parse).unwrap_or_default()
    }

    /// Canonical storage form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Certified => "certified",
            Self::Rejected => "rejected",
            Self::Pending => "pending",
        }
    }

    pub fn is_certified(&self) -> bool {
        matches!(self, Self::Certified)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_certified_variants() {
        for raw in ["yes", "YES", " true ", "Verified", "certified", "1"] {
            assert_eq!(VerificationStatus::parse(raw), VerificationStatus::Certified, "{raw}");
        }
    }

    #[test]
    fn test_parse_rejected_variants() {
        for raw in ["no", "False", "AI", "rejected", "0"] {
            assert_eq!(VerificationStatus::parse(raw), VerificationStatus::Rejected, "{raw}");
        }
    }

    #[test]
    fn test_parse_unknown_is_pending() {
        for raw in ["", "pending", "PENDING", "maybe", "yes please"] {
            assert_eq!(VerificationStatus::parse(raw), VerificationStatus::Pending, "{raw}");
        }
        assert_eq!(VerificationStatus::parse_opt(None), VerificationStatus::Pending);
    }

    #[test]
    fn test_canonical_form_round_trips() {
        for status in [
            VerificationStatus::Certified,
            VerificationStatus::Rejected,
            VerificationStatus::Pending,
        ] {
            assert_eq!(VerificationStatus::parse(status.as_str()), status);
            assert_eq!(status.to_string(), status.as_str());
        }
    }
}
