// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Rustux Hypervisor - Core Module

// Architecture module
pub mod arch;

// Build-time configuration
pub mod config;

// Logging
pub mod debug;

// Device drivers
pub mod dev;

// Entry points, bare-metal image only
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod init;

// Virtual memory layout
pub mod vm;
