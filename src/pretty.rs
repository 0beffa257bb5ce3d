//! Renders a finished row stream as a boxed ASCII table for the REPL.

use crate::exec::RowType;
use crate::types::{Value, ValueKind};

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => "NULL".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Text(s) => s.clone(),
    }
}

pub fn render_table(row_type: &RowType, rows: &[Vec<Value>]) -> String {
    let headers: Vec<String> = row_type.0.iter().map(|c| c.name.clone()).collect();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    let cells: Vec<Vec<String>> = rows.iter().map(|r| r.iter().map(cell_text).collect()).collect();
    for row in &cells {
        for (i, c) in row.iter().enumerate() {
            widths[i] = widths[i].max(c.len());
        }
    }

    let border = |widths: &[usize]| {
        let mut s = String::from("+");
        for w in widths {
            s.push_str(&"-".repeat(w + 2));
            s.push('+');
        }
        s.push('\n');
        s
    };

    let mut out = String::new();
    out.push_str(&border(&widths));
    out.push('|');
    for (h, w) in headers.iter().zip(&widths) {
        out.push_str(&format!(" {:<width$} |", h, width = w));
    }
    out.push('\n');
    out.push_str(&border(&widths));
    for (row, values) in cells.iter().zip(rows) {
        out.push('|');
        for ((c, w), col) in row.iter().zip(&widths).zip(&row_type.0) {
            if matches!(col.kind, ValueKind::Int) {
                out.push_str(&format!(" {:>width$} |", c, width = w));
            } else {
                out.push_str(&format!(" {:<width$} |", c, width = w));
            }
            let _ = values;
        }
        out.push('\n');
    }
    out.push_str(&border(&widths));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ColumnInfo;

    #[test]
    fn renders_headers_and_rows() {
        let row_type = RowType(vec![
            ColumnInfo { table: None, name: "id".into(), kind: ValueKind::Int },
            ColumnInfo { table: None, name: "name".into(), kind: ValueKind::Text },
        ]);
        let rows = vec![vec![Value::Int(1), Value::Text("a".into())]];
        let table = render_table(&row_type, &rows);
        assert!(table.contains("id"));
        assert!(table.contains("name"));
        assert!(table.contains('1'));
        assert!(table.contains('a'));
    }
}
