// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware applied to every response.

pub mod security;

pub use security::add_security_headers;
