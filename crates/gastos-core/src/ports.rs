use async_trait::async_trait;

use crate::{
    domain::{records_from_rows, SheetRecord},
    Result,
};

/// Hexagonal port for the remote expense table.
///
/// Implementations are append-only: there is no update or delete operation.
#[async_trait]
pub trait ExpenseSheet: Send + Sync {
    /// Append one `[amount, description]` row after the last row.
    async fn append_row(&self, amount: f64, description: &str) -> Result<()>;

    /// Every row, header included, as raw text cells.
    async fn read_all_rows(&self) -> Result<Vec<Vec<String>>>;

    /// Data rows keyed by the header cells.
    async fn read_all_records(&self) -> Result<Vec<SheetRecord>> {
        let rows = self.read_all_rows().await?;
        Ok(records_from_rows(&rows))
    }
}
