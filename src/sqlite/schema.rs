use std::sync::Arc;

use rusqlite::Connection;
use rusqlite::types::Value;

use super::query::build_result_set;
use crate::error::DbHelperError;
use crate::results::ResultSet;
use crate::types::RowValues;

const COLLECTIONS: [(&str, i64); 4] = [
    ("MetaDataCollections", 0),
    ("Tables", 1),
    ("Views", 1),
    ("Columns", 2),
];

const COLUMNS_SQL: &str = "SELECT 'main' AS TABLE_CATALOG, m.name AS TABLE_NAME, \
     p.cid + 1 AS ORDINAL_POSITION, p.name AS COLUMN_NAME, p.type AS DATA_TYPE, \
     CASE WHEN p.\"notnull\" = 0 THEN 1 ELSE 0 END AS IS_NULLABLE, \
     p.dflt_value AS COLUMN_DEFAULT, p.pk AS PRIMARY_KEY \
     FROM sqlite_master m JOIN pragma_table_info(m.name) p \
     WHERE m.type IN ('table', 'view') AND m.name NOT LIKE 'sqlite_%' \
     AND (?1 IS NULL OR m.name = ?1 COLLATE NOCASE) \
     AND (?2 IS NULL OR p.name = ?2 COLLATE NOCASE) \
     ORDER BY m.name, p.cid";

fn restriction(restrictions: &[Option<String>], idx: usize) -> Value {
    restrictions
        .get(idx)
        .cloned()
        .flatten()
        .map_or(Value::Null, Value::Text)
}

fn objects_of_type(
    conn: &Connection,
    object_type: &str,
    restrictions: &[Option<String>],
) -> Result<ResultSet, DbHelperError> {
    let mut stmt = conn.prepare_cached(
        "SELECT 'main' AS TABLE_CATALOG, name AS TABLE_NAME, upper(type) AS TABLE_TYPE, \
         sql AS DEFINITION FROM sqlite_master \
         WHERE type = ?1 AND name NOT LIKE 'sqlite_%' \
         AND (?2 IS NULL OR name = ?2 COLLATE NOCASE) ORDER BY name",
    )?;
    build_result_set(
        &mut stmt,
        &[Value::Text(object_type.to_string()), restriction(restrictions, 0)],
    )
}

fn collections() -> ResultSet {
    let mut rs = ResultSet::with_capacity(COLLECTIONS.len());
    rs.set_column_names(Arc::new(vec![
        "CollectionName".to_string(),
        "NumberOfRestrictions".to_string(),
    ]));
    for (name, restrictions) in COLLECTIONS {
        rs.add_row_values(vec![
            RowValues::Text(name.to_string()),
            RowValues::Int(restrictions),
        ]);
    }
    rs
}

/// Metadata for one of the supported collections; `None` lists the collections.
///
/// Restrictions: `Tables`/`Views` take a name; `Columns` takes a table name and a column name.
pub(crate) fn get_schema(
    conn: &Connection,
    collection: Option<&str>,
    restrictions: &[Option<String>],
) -> Result<ResultSet, DbHelperError> {
    let Some(collection) = collection else {
        return Ok(collections());
    };
    match collection.to_ascii_lowercase().as_str() {
        "metadatacollections" => Ok(collections()),
        "tables" => objects_of_type(conn, "table", restrictions),
        "views" => objects_of_type(conn, "view", restrictions),
        "columns" => {
            let mut stmt = conn.prepare_cached(COLUMNS_SQL)?;
            build_result_set(
                &mut stmt,
                &[restriction(restrictions, 0), restriction(restrictions, 1)],
            )
        }
        _ => Err(DbHelperError::Unimplemented(format!(
            "SQLite has no schema collection named {collection}"
        ))),
    }
}
