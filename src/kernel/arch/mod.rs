// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Architecture Support
//!
//! Only ARM64 is implemented. The module also builds on the host so its
//! table and register logic can be unit tested there.

pub mod arm64;
