// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod cli;
pub mod log;
pub mod test;

/// Number of records between progress log lines for long running passes.
pub const PROGRESS_INTERVAL: u64 = 1_000_000;
