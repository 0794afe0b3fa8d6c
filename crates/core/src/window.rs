use crate::Cursor;

/// One page of a paginated read, together with the cursors anchoring the
/// neighboring pages. The page is always in the canonical (descending)
/// order regardless of the direction it was fetched in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultWindow<T> {
    pub page: Vec<T>,
    pub prev_cursor: Cursor,
    pub next_cursor: Cursor,
}

impl<T> ResultWindow<T> {
    pub fn empty() -> Self {
        Self {
            page: Vec::new(),
            prev_cursor: Cursor::End,
            next_cursor: Cursor::End,
        }
    }

    /// Assemble a window from the raw page query output.
    ///
    /// `rows` are `(item, cursor position)` pairs in query direction:
    /// descending for `Start`/`Forward` cursors, ascending for `Backward`.
    /// Up to `count + 1` rows are expected; the extra row only signals that
    /// more rows exist past the page. `saw_probe` reports whether the
    /// opposite-direction probe (limit 1, inverted inequality) matched,
    /// which signals that rows exist on the near side of the cursor.
    pub fn build(cursor: Cursor, count: usize, mut rows: Vec<(T, i64)>, saw_probe: bool) -> Self {
        let backward = matches!(cursor, Cursor::Backward(_));
        let overflow = rows.len() > count;
        if overflow {
            rows.truncate(count);
        }
        if backward {
            rows.reverse();
        }
        let (has_next, has_prev) = if backward {
            (saw_probe, overflow)
        } else {
            (overflow, saw_probe)
        };
        let next_cursor = match rows.last() {
            Some((_, position)) if has_next => Cursor::Forward(*position),
            _ => Cursor::End,
        };
        let prev_cursor = match rows.first() {
            Some((_, position)) if has_prev => Cursor::Backward(*position),
            _ => Cursor::End,
        };
        Self {
            page: rows.into_iter().map(|(item, _)| item).collect(),
            prev_cursor,
            next_cursor,
        }
    }
}
