// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities for Meridian.
//!
//! Every outbound request (analytics sink, form endpoint) goes through a
//! client built here so the User-Agent is consistent.

mod client;

pub use client::{builder, new_client_with_timeout, user_agent};
