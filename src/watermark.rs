// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Server-issued synchronization watermark.
//!
//! A [`Watermark`] marks the point as of which a local snapshot is
//! consistent with the server. It is opaque: the engine stores and compares
//! it but never creates one from the local clock. The only ways to obtain
//! one are deserializing a server response or loading a persisted snapshot.

use serde::{Deserialize, Serialize};

/// Opaque, monotonically ordered token (an ISO-8601 timestamp in practice).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(String);

impl Watermark {
    /// Wrap a token received from the server.
    ///
    /// Blank tokens are not watermarks.
    pub fn from_server(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
