// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! HTTP presentation of the transfer service.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use auth::{Authenticator, Principal, RequestId};
pub use error::ApiError;
pub use server::{build_router, serve};
pub use state::AppState;
