/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Schedulers and their supporting structures.

mod mutable_queue;
pub use mutable_queue::*;

mod terminator;
pub use terminator::*;

mod splash;
pub use splash::*;
