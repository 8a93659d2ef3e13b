// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience helpers for the server and storage boundaries.
//!
//! - [`retry`]: exponential backoff for idempotent operations

pub mod retry;
