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

use crate::error::Result;
use crate::model::TransactionLine;
use crate::range::DateRange;

/// Read-only access to resolved transaction lines
///
/// Implementations must be safe to share across request handlers and
/// background jobs. The aggregation engine never writes through this trait.
pub trait TransactionSource: Send + Sync {
    /// All lines whose datetime falls inside `range` (inclusive)
    fn lines_between(&self, range: &DateRange) -> Result<Vec<TransactionLine>>;
}
