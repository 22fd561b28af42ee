// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

pub mod client;
pub mod discovery;
pub mod exec;
pub mod filter;
pub mod job;
pub mod lookup;

pub use client::{create_client, list_pods};
