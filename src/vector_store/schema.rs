//! The single turn schema every scenario collection is created from.

/// Column type of a turn field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    VarChar(usize),
    Text,
    BigInt,
    Bool,
    Real,
    Json,
    Vector,
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub primary_key: bool,
}

const fn field(name: &'static str, ty: FieldType) -> Field {
    Field {
        name,
        ty,
        primary_key: false,
    }
}

pub const EMBEDDING_FIELD: &str = "message_embedding";

/// Turn fields in insert order.
pub const TURN_FIELDS: &[Field] = &[
    Field {
        name: "message_id",
        ty: FieldType::VarChar(64),
        primary_key: true,
    },
    field("scenario_id", FieldType::VarChar(64)),
    field("turn_number", FieldType::BigInt),
    field("real_timestamp_utc_ms", FieldType::BigInt),
    field("sender_character_id", FieldType::VarChar(64)),
    field("sender_is_player", FieldType::Bool),
    field("venue_name", FieldType::VarChar(256)),
    field("sub_location_in_venue", FieldType::VarChar(256)),
    field("present_character_ids_at_location", FieldType::Json),
    field("fictional_datetime_iso", FieldType::VarChar(35)),
    field("fictional_total_time_elapsed_seconds", FieldType::BigInt),
    field("message_content_text", FieldType::Text),
    field("message_type", FieldType::VarChar(50)),
    field("action_details", FieldType::VarChar(1024)),
    field("dialogue_target_ids", FieldType::Json),
    field("mentioned_character_ids_in_content", FieldType::Json),
    field("key_topics_or_entities", FieldType::Json),
    field("sender_expressed_emotion", FieldType::VarChar(50)),
    field("references_previous_message_ids", FieldType::Json),
    field("plot_relevance_score", FieldType::Real),
    field(EMBEDDING_FIELD, FieldType::Vector),
];

fn column_type(ty: FieldType, dimensions: usize) -> String {
    match ty {
        FieldType::VarChar(n) => format!("VARCHAR({n})"),
        FieldType::Text => "TEXT".to_string(),
        FieldType::BigInt => "BIGINT".to_string(),
        FieldType::Bool => "BOOLEAN".to_string(),
        FieldType::Real => "REAL".to_string(),
        FieldType::Json => "JSONB".to_string(),
        FieldType::Vector => format!("vector({dimensions})"),
    }
}

/// `CREATE TABLE` statement for a collection.
pub fn create_table_sql(collection: &str, dimensions: usize) -> String {
    let columns = TURN_FIELDS
        .iter()
        .map(|f| {
            let constraint = if f.primary_key { " PRIMARY KEY" } else { " NOT NULL" };
            format!("{} {}{constraint}", f.name, column_type(f.ty, dimensions))
        })
        .collect::<Vec<_>>()
        .join(",\n    ");
    format!("CREATE TABLE IF NOT EXISTS {collection} (\n    {columns}\n)")
}

/// HNSW index on the embedding column using Euclidean distance.
pub fn create_index_sql(collection: &str, m: u32, ef_construction: u32) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {collection}_emb ON {collection}
         USING hnsw ({EMBEDDING_FIELD} vector_l2_ops) WITH (m = {m}, ef_construction = {ef_construction})"
    )
}

/// Existence check scoped to `current_schema()`, the schema `to_regclass` resolves to.
pub const COLLECTION_EXISTS_SQL: &str = "SELECT EXISTS (SELECT FROM information_schema.tables
     WHERE table_schema = current_schema() AND table_name = $1)";

/// Statements that bring a collection up to the full schema, in order.
///
/// The index statement is always included so a table created without its
/// index gets one on the next call.
pub fn provisioning_sql(
    collection: &str,
    dimensions: usize,
    m: u32,
    ef_construction: u32,
    table_exists: bool,
) -> Vec<String> {
    let mut statements = Vec::with_capacity(2);
    if !table_exists {
        statements.push(create_table_sql(collection, dimensions));
    }
    statements.push(create_index_sql(collection, m, ef_construction));
    statements
}

/// Parameterized insert covering every field.
pub fn insert_sql(collection: &str) -> String {
    let names = TURN_FIELDS.iter().map(|f| f.name).collect::<Vec<_>>().join(", ");
    let params = TURN_FIELDS
        .iter()
        .enumerate()
        .map(|(i, f)| match f.ty {
            FieldType::Vector => format!("${}::vector", i + 1),
            _ => format!("${}", i + 1),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {collection} ({names}) VALUES ({params})")
}

/// Column list for reads; the embedding is never read back.
pub fn select_columns() -> String {
    TURN_FIELDS
        .iter()
        .filter(|f| f.ty != FieldType::Vector)
        .map(|f| f.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// pgvector text literal for a float slice.
pub fn vector_literal(values: &[f32]) -> String {
    format!(
        "[{}]",
        values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
    )
}
