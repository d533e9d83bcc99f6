use rusqlite::{params, params_from_iter};
use serde_json::Value;

use repomirror_types::{BulkAction, DocFilter, Hit, Result, SearchIndex};

use crate::SqliteIndex;

// ── Helpers ───────────────────────────────────────────────────────────────

/// `branch.displayId` -> `$."branch"."displayId"`
fn json_path(field: &str) -> String {
    let mut path = String::from("$");
    for segment in field.split('.') {
        path.push_str(".\"");
        path.push_str(&segment.replace('"', "\\\""));
        path.push('"');
    }
    path
}

/// WHERE clause and positional arguments for `filter` within `index`.
/// Values compare as text so numeric ids match their string form.
fn where_clause(index: &str, filter: &DocFilter) -> (String, Vec<String>) {
    let mut sql = String::from("index_name = ?1");
    let mut args = vec![index.to_string()];
    for (field, value) in filter.terms() {
        args.push(json_path(field));
        let path_pos = args.len();
        args.push(value.clone());
        sql.push_str(&format!(
            " AND CAST(json_extract(body, ?{}) AS TEXT) = ?{}",
            path_pos,
            path_pos + 1
        ));
    }
    (sql, args)
}

const UPSERT_SQL: &str = "INSERT INTO documents (index_name, doc_id, body) VALUES (?1, ?2, ?3)
     ON CONFLICT(index_name, doc_id) DO UPDATE SET body = excluded.body";

const INSERT_GENERATED_SQL: &str = "INSERT INTO documents (index_name, doc_id, body)
     VALUES (?1, lower(hex(randomblob(16))), ?2)";

// ── impl SearchIndex ──────────────────────────────────────────────────────

impl SearchIndex for SqliteIndex {
    fn ensure_index(&self, index: &str, mapping: Option<&Value>) -> Result<bool> {
        let conn = self.conn()?;
        let mapping_json = mapping.map(serde_json::to_string).transpose()?;
        let created = conn.execute(
            "INSERT OR IGNORE INTO indices (name, mapping) VALUES (?1, ?2)",
            params![index, mapping_json],
        )?;
        Ok(created == 1)
    }

    fn upsert(&self, index: &str, id: &str, doc: &Value) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(UPSERT_SQL, params![index, id, serde_json::to_string(doc)?])?;
        Ok(())
    }

    fn search_phrase(&self, index: &str, field: &str, value: &str) -> Result<Vec<Hit>> {
        let conn = self.conn()?;
        let (clause, args) = where_clause(index, &DocFilter::all().must(field, value));
        let mut stmt = conn.prepare(&format!(
            "SELECT doc_id, body FROM documents WHERE {clause} ORDER BY rowid"
        ))?;
        let rows: rusqlite::Result<Vec<(String, String)>> = stmt
            .query_map(params_from_iter(args.iter()), |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect();

        rows?
            .into_iter()
            .map(|(id, body)| -> Result<Hit> {
                Ok(Hit {
                    id,
                    source: serde_json::from_str(&body)?,
                })
            })
            .collect()
    }

    fn delete_by_query(&self, index: &str, filter: &DocFilter) -> Result<u64> {
        let conn = self.conn()?;
        let (clause, args) = where_clause(index, filter);
        let deleted = conn.execute(
            &format!("DELETE FROM documents WHERE {clause}"),
            params_from_iter(args.iter()),
        )?;
        Ok(deleted as u64)
    }

    fn count(&self, index: &str, filter: &DocFilter) -> Result<u64> {
        let conn = self.conn()?;
        let (clause, args) = where_clause(index, filter);
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM documents WHERE {clause}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn bulk(&self, actions: &[BulkAction]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut upsert = tx.prepare(UPSERT_SQL)?;
            let mut insert = tx.prepare(INSERT_GENERATED_SQL)?;
            for action in actions {
                let body = serde_json::to_string(&action.source)?;
                match &action.id {
                    Some(id) => upsert.execute(params![action.index, id, body])?,
                    None => insert.execute(params![action.index, body])?,
                };
            }
        }
        tx.commit()?;
        Ok(actions.len())
    }

    // Reads on the same connection already observe committed writes.
    fn refresh(&self, _index: &str) -> Result<()> {
        Ok(())
    }
}
