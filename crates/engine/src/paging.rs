use quiver_core::{Cursor, State};

pub(crate) fn states_in(states: &[State]) -> String {
    let ids: Vec<String> = states.iter().map(|state| state.id().to_string()).collect();
    format!("state IN ({})", ids.join(", "))
}

/// Builder for the bidirectional paginated selects.
///
/// Each call is one SQL statement: the page query, limited to `count + 1`
/// rows in the cursor's direction, unioned with a one-row probe in the
/// opposite direction under the inverted inequality. The probe row only
/// signals that rows exist on the near side of the cursor. A literal
/// discriminator column keeps the two parts separable without relying on
/// union output order.
///
/// Parameters: `?1` is the source id, `?2` the cursor comparand.
pub(crate) struct PagedSelect {
    pub table: String,
    pub columns: &'static str,
    pub conditions: String,
    pub cursor_column: &'static str,
    pub index: Option<String>,
}

impl PagedSelect {
    pub fn sql(&self, cursor: Cursor, count: usize) -> String {
        let (order, cmp, probe_order, probe_cmp) = match cursor {
            Cursor::Backward(_) => ("ASC", ">", "DESC", "<="),
            _ => ("DESC", "<", "ASC", ">="),
        };
        let indexed = match &self.index {
            Some(name) => format!(" INDEXED BY {name}"),
            None => String::new(),
        };
        format!(
            "SELECT 0 AS part, {cols} FROM (\
             SELECT {cols} FROM {table}{indexed} WHERE {cond} AND {cc} {cmp} ?2 \
             ORDER BY {cc} {order} LIMIT {page_limit}) \
             UNION ALL \
             SELECT 1 AS part, {cols} FROM (\
             SELECT {cols} FROM {table}{indexed} WHERE {cond} AND {cc} {probe_cmp} ?2 \
             ORDER BY {cc} {probe_order} LIMIT 1)",
            cols = self.columns,
            table = self.table,
            cond = self.conditions,
            cc = self.cursor_column,
            page_limit = count + 1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> PagedSelect {
        PagedSelect {
            table: "t_edges".into(),
            columns: "destination_id",
            conditions: "source_id = ?1 AND state IN (0)".into(),
            cursor_column: "destination_id",
            index: None,
        }
    }

    #[test]
    fn forward_pages_descending_with_ascending_probe() {
        let sql = query().sql(Cursor::Start, 2);
        assert!(sql.contains("destination_id < ?2 ORDER BY destination_id DESC LIMIT 3"));
        assert!(sql.contains("destination_id >= ?2 ORDER BY destination_id ASC LIMIT 1"));
    }

    #[test]
    fn backward_pages_ascending_with_descending_probe() {
        let sql = query().sql(Cursor::Backward(400), 2);
        assert!(sql.contains("destination_id > ?2 ORDER BY destination_id ASC LIMIT 3"));
        assert!(sql.contains("destination_id <= ?2 ORDER BY destination_id DESC LIMIT 1"));
    }

    #[test]
    fn index_hint_lands_in_both_parts() {
        let mut q = query();
        q.index = Some("t_edges_source_dest".into());
        let sql = q.sql(Cursor::Start, 2);
        assert_eq!(sql.matches("INDEXED BY t_edges_source_dest").count(), 2);
    }

    #[test]
    fn states_render_as_literal_list() {
        assert_eq!(
            states_in(&[State::Normal, State::Archived]),
            "state IN (0, 2)"
        );
    }
}
