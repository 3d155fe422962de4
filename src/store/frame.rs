use std::collections::HashSet;

/// A loosely-typed table of scraped rows; every cell is text or absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Frame {
    pub fn new(columns: Vec<String>) -> Self {
        Frame {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build from keyed records; columns appear in first-seen order.
    pub fn from_records(records: &[Vec<(&str, Option<String>)>]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for (key, _) in record {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.to_string());
                }
            }
        }
        let mut frame = Frame::new(columns);
        for record in records {
            let row = frame
                .columns
                .iter()
                .map(|c| {
                    record
                        .iter()
                        .find(|(k, _)| k == c)
                        .and_then(|(_, v)| v.clone())
                })
                .collect();
            frame.rows.push(row);
        }
        frame
    }

    /// Append a row, padding with absent cells or truncating to the column count.
    pub fn push_row(&mut self, mut row: Vec<Option<String>>) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn with_constant(mut self, column: &str, value: &str) -> Self {
        self.columns.push(column.to_string());
        for row in &mut self.rows {
            row.push(Some(value.to_string()));
        }
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx].as_deref()).collect())
    }

    /// Distinct, non-blank values of a column in first-seen order.
    pub fn distinct_values(&self, name: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.column(name)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|v| !v.is_empty() && seen.insert(v.to_string()))
            .map(String::from)
            .collect()
    }

    pub fn missing_columns<'a>(&self, expected: &[&'a str]) -> Vec<&'a str> {
        expected
            .iter()
            .copied()
            .filter(|e| !self.columns.iter().any(|c| c == e))
            .collect()
    }

    /// Stack frames over the union of their columns.
    pub fn concat(frames: Vec<Frame>) -> Frame {
        let mut columns: Vec<String> = Vec::new();
        for f in &frames {
            for c in &f.columns {
                if !columns.contains(c) {
                    columns.push(c.clone());
                }
            }
        }
        let mut out = Frame::new(columns);
        for f in frames {
            let mapping: Vec<Option<usize>> = out
                .columns
                .iter()
                .map(|c| f.columns.iter().position(|fc| fc == c))
                .collect();
            for row in f.rows {
                let aligned = mapping
                    .iter()
                    .map(|idx| idx.and_then(|i| row[i].clone()))
                    .collect();
                out.rows.push(aligned);
            }
        }
        out
    }
}
