//! Diesel schema definitions.

diesel::table! {
    documents (collection, id) {
        collection -> Text,
        id -> Text,
        body -> Binary,
        updated_at -> Timestamp,
    }
}
