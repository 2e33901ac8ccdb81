// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("peer id space exhausted: maximum of {max_peers} peers")]
    CapacityExceeded { max_peers: usize },

    #[error("malformed origin {0}")]
    MalformedOrigin(String),

    #[error("malformed prefix {0}")]
    MalformedPrefix(String),

    #[error("malformed max length {0}")]
    MalformedMaxLength(String),

    #[error("address family mismatch for {0}")]
    AddressFamilyMismatch(String),
}
