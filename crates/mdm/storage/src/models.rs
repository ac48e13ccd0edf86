//! Database models.

use diesel::prelude::*;

use crate::schema::documents;

/// Key and body of a stored document.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = documents)]
pub struct DocumentRow {
    pub id: String,
    pub body: Vec<u8>,
}

/// New document for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument<'a> {
    pub collection: &'a str,
    pub id: &'a str,
    pub body: &'a [u8],
    pub updated_at: chrono::NaiveDateTime,
}
