// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use retailpivot_core::RetailPivotError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{kind} {id} does not exist")]
    NotFound { kind: &'static str, id: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StorageError> for RetailPivotError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => RetailPivotError::NotFound(err.to_string()),
            StorageError::InvalidInput(msg) => RetailPivotError::InvalidArgument(msg),
            StorageError::Io(e) => RetailPivotError::Io(e),
            StorageError::Json(e) => RetailPivotError::Json(e),
        }
    }
}
