/// A parsed but not yet interpreted table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// One label per column, unique within the table.
    pub headers: Vec<String>,
    /// Data rows. Every row is exactly `headers.len()` cells wide.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of column `idx`, top to bottom.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows
            .iter()
            .map(move |r| r.get(idx).map(String::as_str).unwrap_or(""))
    }
}
