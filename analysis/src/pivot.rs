use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use tracing::{debug, trace};

/// content of one table cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Count(u64),
    Number(f64),
    Text(String),
}

impl Value {
    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Count(count) => Some(*count as f64),
            Self::Number(number) => Some(*number),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count}"),
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// how values landing in the same cell are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    /// numeric sum, text values are ignored
    Sum,
    /// keep the first value seen
    First,
    /// comma separated concatenation
    Join,
}

impl Reducer {
    fn reduce(self, current: Value, next: Value) -> Value {
        match self {
            Self::Sum => match (current, next) {
                (Value::Count(a), Value::Count(b)) => Value::Count(a.saturating_add(b)),
                (a, b) => match (a.as_number(), b.as_number()) {
                    (Some(x), Some(y)) => Value::Number(x + y),
                    (Some(_), None) => a,
                    _ => b,
                },
            },
            Self::First => current,
            Self::Join => Value::Text(format!("{current},{next}")),
        }
    }
}

/// Sparse cells of a pivot, keyed by row and column label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cells(BTreeMap<String, BTreeMap<String, Value>>);

impl Cells {
    pub fn get(&self, row: &str, column: &str) -> Option<&Value> {
        self.0.get(row).and_then(|columns| columns.get(column))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// lay the cells out along fixed row and column orders, labels outside them are dropped
    pub fn render<S: AsRef<str>>(&self, title: &str, header: &[S], rows: &[S], columns: &[S]) -> Table {
        for (row, cells) in self.0.iter() {
            if !rows.iter().any(|known| known.as_ref() == row) {
                debug!(table = title, row = %row, "Row not part of the table layout");
            }
            for column in cells.keys() {
                if !columns.iter().any(|known| known.as_ref() == column) {
                    debug!(table = title, column = %column, "Column not part of the table layout");
                }
            }
        }

        Table {
            title: title.to_string(),
            header: header.iter().map(|label| label.as_ref().to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| {
                    let row = row.as_ref();
                    let cells = columns
                        .iter()
                        .map(|column| self.get(row, column.as_ref()).cloned())
                        .collect();

                    (row.to_string(), cells)
                })
                .collect(),
        }
    }
}

/// Group items by a row and a column key and combine their values per cell.
///
/// Items for which any of the key or value functions yields `None` do not
/// contribute. The same items always produce the same cells. Items are
/// usually `&ResultRecord`, a report that spreads one record over several
/// columns pivots over `(record, field)` pairs instead.
pub fn pivot<T, I, R, C, V>(items: I, row_key: R, column_key: C, value: V, reducer: Reducer) -> Cells
where
    T: Copy + fmt::Debug,
    I: IntoIterator<Item = T>,
    R: Fn(T) -> Option<String>,
    C: Fn(T) -> Option<String>,
    V: Fn(T) -> Option<Value>,
{
    let mut cells = Cells::default();

    for item in items {
        let (Some(row), Some(column), Some(value)) = (row_key(item), column_key(item), value(item)) else {
            trace!(item = ?item, "Item does not contribute to pivot");
            continue;
        };

        let entry = cells.0.entry(row).or_default();
        let reduced = match entry.remove(&column) {
            Some(current) => reducer.reduce(current, value),
            None => value,
        };
        entry.insert(column, reduced);
    }

    cells
}

/// Rendered table: a title line, a header line, then one line per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub title: String,
    pub header: Vec<String>,
    pub rows: Vec<(String, Vec<Option<Value>>)>,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", self.header.join(","))?;

        for (label, cells) in self.rows.iter() {
            f.write_str(label)?;
            for cell in cells.iter() {
                match cell {
                    Some(value) => write!(f, ",{value}")?,
                    None => f.write_str(",")?,
                }
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use falcon_ingest::ResultRecord;

    fn record(system: &str, cc: &str, threads: u32, commits: u64) -> ResultRecord {
        ResultRecord {
            system: system.to_string(),
            workload: "TPC-C-NP new_order".to_string(),
            threads,
            cc: cc.to_string(),
            commits,
            total: commits,
            latency: None,
        }
    }

    fn by_system_and_cc(records: &[ResultRecord], reducer: Reducer) -> Cells {
        pivot(
            records,
            |r| Some(r.system.clone()),
            |r| Some(r.cc.clone()),
            |r| Some(Value::Count(r.commits)),
            reducer,
        )
    }

    #[test]
    fn sums_cells_and_leaves_gaps_empty() {
        let records = vec![
            record("Inp", "OCC", 48, 10),
            record("Inp", "OCC", 48, 5),
            record("Outp", "TO", 48, 7),
        ];

        let table = by_system_and_cc(&records, Reducer::Sum).render(
            "TPCC-48",
            &["sysname", "TO", "OCC"],
            &["Inp", "Outp", "ZenS"],
            &["TO", "OCC"],
        );

        assert_eq!(table.to_string(), "TPCC-48\nsysname,TO,OCC\nInp,,15\nOutp,7,\nZenS,,\n");
    }

    #[test]
    fn first_and_join_reducers() {
        let records = vec![record("Inp", "OCC", 48, 10), record("Inp", "OCC", 48, 5)];

        assert_eq!(
            by_system_and_cc(&records, Reducer::First).get("Inp", "OCC"),
            Some(&Value::Count(10))
        );
        assert_eq!(
            by_system_and_cc(&records, Reducer::Join).get("Inp", "OCC"),
            Some(&Value::Text("10,5".to_string()))
        );
    }

    #[test]
    fn records_without_keys_are_ignored() {
        let records = vec![record("Inp", "OCC", 48, 10), record("Inp", "TO", 48, 5)];

        let cells = pivot(
            &records,
            |r| Some(r.system.clone()),
            |r| (r.cc == "OCC").then(|| r.cc.clone()),
            |r| Some(Value::Count(r.commits)),
            Reducer::Sum,
        );

        assert_eq!(cells.get("Inp", "OCC"), Some(&Value::Count(10)));
        assert_eq!(cells.get("Inp", "TO"), None);
    }

    #[test]
    fn same_records_render_the_same_table() {
        let records = vec![
            record("ZenS", "MVOCC", 16, 3),
            record("Inp", "OCC", 48, 10),
            record("ZenS", "MVOCC", 16, 4),
        ];
        let render = |records: &[ResultRecord]| {
            by_system_and_cc(records, Reducer::Sum)
                .render("t", &["sysname", "OCC", "MVOCC"], &["Inp", "ZenS"], &["OCC", "MVOCC"])
                .to_string()
        };

        assert_eq!(render(&records), render(&records));
        assert_eq!(render(&records), "t\nsysname,OCC,MVOCC\nInp,10,\nZenS,,7\n");
    }
}
