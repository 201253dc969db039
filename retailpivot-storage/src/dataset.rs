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

use retailpivot_core::{Brand, CartItem, Product, Receipt, Shop};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::StorageError;

/// On-disk snapshot of every table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub brands: Vec<Brand>,
    #[serde(default)]
    pub shops: Vec<Shop>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub receipts: Vec<Receipt>,
    #[serde(default)]
    pub cart_items: Vec<CartItem>,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Write the snapshot next to `path` and rename it into place
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
