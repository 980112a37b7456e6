//! The `analytics` table contract.
//!
//! Tables, columns and references are declared once here. DDL, insert
//! statements, load order and the pre-commit orphan checks are all derived
//! from this declaration, so the loader never hand-writes table SQL.

use std::collections::HashMap;

use station_datagen::EntityKind;

/// Schema every analytics table and view lives in
pub const SCHEMA_NAME: &str = "analytics";

/// Column types used by the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// 32-bit integer
    Integer,
    /// 64-bit integer
    BigInt,
    /// Variable-length string
    VarChar(u16),
    Boolean,
    /// Decimal with precision and scale
    Decimal(u8, u8),
    Timestamp,
    Date,
}

impl SqlType {
    /// Returns the DuckDB type string
    pub fn to_duckdb(&self) -> String {
        match self {
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::VarChar(n) => format!("VARCHAR({})", n),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Decimal(p, s) => format!("DECIMAL({},{})", p, s),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Date => "DATE".to_string(),
        }
    }

    /// Parameter placeholder for this type.
    ///
    /// Decimals, dates and timestamps are bound as text and cast by the
    /// engine, which keeps money exact.
    pub fn placeholder(&self) -> String {
        match self {
            SqlType::Decimal(_, _) | SqlType::Timestamp | SqlType::Date => {
                format!("CAST(? AS {})", self.to_duckdb())
            }
            _ => "?".to_string(),
        }
    }
}

/// Reference from a fact column to a dimension key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub to_table: String,
    pub to_column: String,
}

/// Column definition
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub not_null: bool,
    pub primary_key: bool,
    pub foreign_key: Option<ForeignKey>,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            not_null: false,
            primary_key: false,
            foreign_key: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    /// Reference to a dimension key. Nullable unless also `not_null`.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKey {
            to_table: table.into(),
            to_column: column.into(),
        });
        self
    }
}

/// Whether a table holds dimension or fact rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRole {
    Dimension,
    Fact,
}

/// Table definition
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub role: TableRole,
    pub columns: Vec<Column>,
    /// Rows are natural keys shared across batches; duplicate inserts are skipped
    pub shared_rows: bool,
}

impl Table {
    pub fn new(name: impl Into<String>, role: TableRole) -> Self {
        Self {
            name: name.into(),
            role,
            columns: Vec::new(),
            shared_rows: false,
        }
    }

    pub fn column(mut self, col: Column) -> Self {
        self.columns.push(col);
        self
    }

    pub fn shared_rows(mut self) -> Self {
        self.shared_rows = true;
        self
    }

    /// `analytics.<name>`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", SCHEMA_NAME, self.name)
    }

    /// Get the primary key column name (single-column keys only)
    pub fn primary_key_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .map(|c| c.name.as_str())
    }

    /// Get all foreign key relationships
    pub fn foreign_keys(&self) -> Vec<(&str, &ForeignKey)> {
        self.columns
            .iter()
            .filter_map(|c| c.foreign_key.as_ref().map(|fk| (c.name.as_str(), fk)))
            .collect()
    }

    /// `CREATE TABLE IF NOT EXISTS` for this table.
    ///
    /// References are not declared as constraints; they are verified by
    /// [`Table::orphan_checks`] before the load commits.
    pub fn create_sql(&self) -> String {
        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", quote_ident(&c.name), c.sql_type.to_duckdb());
                if c.not_null {
                    def.push_str(" NOT NULL");
                }
                def
            })
            .collect();

        if let Some(pk) = self.primary_key_column() {
            defs.push(format!("PRIMARY KEY ({})", quote_ident(pk)));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.qualified_name(),
            defs.join(", ")
        )
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.qualified_name())
    }

    /// Parameterised single-row insert covering every column in order
    pub fn insert_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let placeholders: Vec<String> = self.columns.iter().map(|c| c.sql_type.placeholder()).collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.qualified_name(),
            columns.join(", "),
            placeholders.join(", ")
        );
        if self.shared_rows {
            sql.push_str(" ON CONFLICT DO NOTHING");
        }
        sql
    }

    /// One counting query per reference: rows whose key has no match in the
    /// referenced table. NULL keys are absent references, not orphans.
    pub fn orphan_checks(&self) -> Vec<OrphanCheck> {
        self.foreign_keys()
            .into_iter()
            .map(|(column, fk)| {
                let sql = format!(
                    "SELECT COUNT(*) FROM {}.{} AS f LEFT JOIN {}.{} AS d ON f.{} = d.{} \
                     WHERE f.{} IS NOT NULL AND d.{} IS NULL",
                    SCHEMA_NAME,
                    self.name,
                    SCHEMA_NAME,
                    fk.to_table,
                    quote_ident(column),
                    quote_ident(&fk.to_column),
                    quote_ident(column),
                    quote_ident(&fk.to_column),
                );
                OrphanCheck {
                    table: self.name.clone(),
                    column: column.to_string(),
                    referenced: fk.to_table.clone(),
                    sql,
                }
            })
            .collect()
    }
}

/// A query counting dangling references from `table.column`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanCheck {
    pub table: String,
    pub column: String,
    pub referenced: String,
    pub sql: String,
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Complete schema definition
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub tables: Vec<Table>,
    table_index: HashMap<String, usize>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed star schema the pipeline loads
    pub fn analytics() -> Self {
        Self::new()
            .table(
                Table::new("dim_customer", TableRole::Dimension)
                    .column(Column::new("customer_id", SqlType::BigInt).primary_key())
                    .column(Column::new("first_name", SqlType::VarChar(100)).not_null())
                    .column(Column::new("last_name", SqlType::VarChar(100)).not_null())
                    .column(Column::new("full_name", SqlType::VarChar(201)).not_null())
                    .column(Column::new("customer_status", SqlType::VarChar(16)).not_null())
                    .column(Column::new("is_active", SqlType::Boolean).not_null())
                    .column(Column::new("join_date", SqlType::Date).not_null()),
            )
            .table(
                Table::new("dim_fuel", TableRole::Dimension)
                    .column(Column::new("fuel_id", SqlType::BigInt).primary_key())
                    .column(Column::new("fuel_type", SqlType::VarChar(32)).not_null())
                    .column(Column::new("price_per_liter", SqlType::Decimal(10, 2)).not_null()),
            )
            .table(
                Table::new("dim_station", TableRole::Dimension)
                    .column(Column::new("station_id", SqlType::BigInt).primary_key())
                    .column(Column::new("station_name", SqlType::VarChar(120)).not_null())
                    .column(Column::new("city", SqlType::VarChar(100)).not_null()),
            )
            .table(
                Table::new("dim_product", TableRole::Dimension)
                    .column(Column::new("product_id", SqlType::BigInt).primary_key())
                    .column(Column::new("product_type", SqlType::VarChar(64)).not_null())
                    .column(Column::new("category", SqlType::VarChar(32)).not_null())
                    .column(Column::new("price", SqlType::Decimal(10, 2)).not_null())
                    .column(Column::new("stock", SqlType::Integer).not_null()),
            )
            .table(
                Table::new("dim_trailer", TableRole::Dimension)
                    .column(Column::new("trailer_id", SqlType::BigInt).primary_key())
                    .column(Column::new("registry_number", SqlType::VarChar(16)).not_null())
                    .column(Column::new("trailer_status", SqlType::VarChar(16)).not_null())
                    .column(Column::new("is_available", SqlType::Boolean).not_null())
                    .column(Column::new("rental_start", SqlType::Date))
                    .column(Column::new("rental_end", SqlType::Date)),
            )
            .table(
                Table::new("dim_date", TableRole::Dimension)
                    .column(Column::new("date_key", SqlType::Integer).primary_key())
                    .column(Column::new("full_date", SqlType::Date).not_null())
                    .column(Column::new("day", SqlType::Integer).not_null())
                    .column(Column::new("month", SqlType::Integer).not_null())
                    .column(Column::new("year", SqlType::Integer).not_null())
                    .column(Column::new("quarter", SqlType::Integer).not_null())
                    .column(Column::new("day_of_week", SqlType::Integer).not_null())
                    .column(Column::new("day_name", SqlType::VarChar(9)).not_null())
                    .column(Column::new("month_name", SqlType::VarChar(9)).not_null())
                    .column(Column::new("is_weekend", SqlType::Boolean).not_null())
                    .shared_rows(),
            )
            .table(
                Table::new("fct_orders", TableRole::Fact)
                    .column(Column::new("order_id", SqlType::BigInt).primary_key())
                    .column(
                        Column::new("date_key", SqlType::Integer)
                            .references("dim_date", "date_key")
                            .not_null(),
                    )
                    .column(
                        Column::new("customer_id", SqlType::BigInt)
                            .references("dim_customer", "customer_id")
                            .not_null(),
                    )
                    .column(
                        Column::new("fuel_id", SqlType::BigInt)
                            .references("dim_fuel", "fuel_id")
                            .not_null(),
                    )
                    .column(
                        Column::new("station_id", SqlType::BigInt)
                            .references("dim_station", "station_id")
                            .not_null(),
                    )
                    .column(Column::new("product_id", SqlType::BigInt).references("dim_product", "product_id"))
                    .column(Column::new("trailer_id", SqlType::BigInt).references("dim_trailer", "trailer_id"))
                    .column(Column::new("order_status", SqlType::VarChar(16)).not_null())
                    .column(Column::new("ordered_at", SqlType::Timestamp).not_null())
                    .column(Column::new("quantity_liters", SqlType::Integer).not_null())
                    .column(Column::new("unit_price", SqlType::Decimal(10, 2)).not_null())
                    .column(Column::new("total_cost", SqlType::Decimal(12, 2)).not_null())
                    .column(Column::new("product_cost", SqlType::Decimal(10, 2))),
            )
    }

    pub fn table(mut self, table: Table) -> Self {
        let idx = self.tables.len();
        self.table_index.insert(table.name.clone(), idx);
        self.tables.push(table);
        self
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.table_index.get(name).map(|&idx| &self.tables[idx])
    }

    /// Get tables in load order (referenced tables first)
    pub fn tables_in_order(&self) -> Vec<&Table> {
        let mut visited = vec![false; self.tables.len()];
        let mut result = Vec::with_capacity(self.tables.len());

        fn visit<'a>(
            idx: usize,
            tables: &'a [Table],
            table_index: &HashMap<String, usize>,
            visited: &mut [bool],
            result: &mut Vec<&'a Table>,
        ) {
            if visited[idx] {
                return;
            }
            visited[idx] = true;

            for (_, fk) in tables[idx].foreign_keys() {
                if let Some(&dep_idx) = table_index.get(&fk.to_table) {
                    visit(dep_idx, tables, table_index, visited, result);
                }
            }

            result.push(&tables[idx]);
        }

        for idx in 0..self.tables.len() {
            visit(
                idx,
                &self.tables,
                &self.table_index,
                &mut visited,
                &mut result,
            );
        }

        result
    }
}

/// Table and key column holding an entity kind's surrogate keys.
///
/// Calendar days are keyed by date and have no surrogate column.
pub fn surrogate_key_column(kind: EntityKind) -> Option<(&'static str, &'static str)> {
    match kind {
        EntityKind::Customer => Some(("dim_customer", "customer_id")),
        EntityKind::FuelType => Some(("dim_fuel", "fuel_id")),
        EntityKind::Station => Some(("dim_station", "station_id")),
        EntityKind::Product => Some(("dim_product", "product_id")),
        EntityKind::Trailer => Some(("dim_trailer", "trailer_id")),
        EntityKind::Order => Some(("fct_orders", "order_id")),
        EntityKind::CalendarDay => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_builder() {
        let col = Column::new("customer_id", SqlType::BigInt).primary_key();

        assert_eq!(col.name, "customer_id");
        assert!(col.primary_key);
        assert!(col.not_null);
    }

    #[test]
    fn test_facts_load_after_dimensions() {
        let schema = Schema::new()
            .table(
                Table::new("fct_orders", TableRole::Fact)
                    .column(Column::new("order_id", SqlType::BigInt).primary_key())
                    .column(
                        Column::new("customer_id", SqlType::BigInt)
                            .references("dim_customer", "customer_id")
                            .not_null(),
                    ),
            )
            .table(
                Table::new("dim_customer", TableRole::Dimension)
                    .column(Column::new("customer_id", SqlType::BigInt).primary_key()),
            );

        let names: Vec<&str> = schema.tables_in_order().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["dim_customer", "fct_orders"]);
    }

    #[test]
    fn test_analytics_contract_order() {
        let schema = Schema::analytics();
        let ordered = schema.tables_in_order();
        let last = ordered.last().unwrap();

        assert_eq!(ordered.len(), 7);
        assert_eq!(last.name, "fct_orders");
        assert!(ordered[..6].iter().all(|t| t.role == TableRole::Dimension));
        assert_eq!(last.foreign_keys().len(), 6);
    }

    #[test]
    fn test_create_sql() {
        let schema = Schema::analytics();
        let sql = schema.get_table("dim_fuel").unwrap().create_sql();

        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS analytics.dim_fuel (\"fuel_id\" BIGINT NOT NULL, \
             \"fuel_type\" VARCHAR(32) NOT NULL, \"price_per_liter\" DECIMAL(10,2) NOT NULL, \
             PRIMARY KEY (\"fuel_id\"))"
        );
    }

    #[test]
    fn test_insert_sql_casts_and_conflicts() {
        let schema = Schema::analytics();

        let fuel = schema.get_table("dim_fuel").unwrap().insert_sql();
        assert!(fuel.contains("CAST(? AS DECIMAL(10,2))"));
        assert!(!fuel.contains("ON CONFLICT"));

        let dates = schema.get_table("dim_date").unwrap().insert_sql();
        assert!(dates.ends_with("ON CONFLICT DO NOTHING"));
        assert_eq!(dates.matches('?').count(), 10);
    }

    #[test]
    fn test_orphan_checks_follow_references() {
        let schema = Schema::analytics();
        let checks = schema.get_table("fct_orders").unwrap().orphan_checks();
        let referenced: Vec<&str> = checks.iter().map(|c| c.referenced.as_str()).collect();

        assert_eq!(
            referenced,
            vec!["dim_date", "dim_customer", "dim_fuel", "dim_station", "dim_product", "dim_trailer"]
        );
        assert!(checks[1].sql.contains("LEFT JOIN analytics.dim_customer"));
        assert!(checks[4].sql.contains("f.\"product_id\" IS NOT NULL"));
        assert!(schema.get_table("dim_customer").unwrap().orphan_checks().is_empty());
    }

    #[test]
    fn test_optional_references_are_nullable() {
        let schema = Schema::analytics();
        let orders = schema.get_table("fct_orders").unwrap();
        let nullable: Vec<&str> = orders
            .columns
            .iter()
            .filter(|c| !c.not_null)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(nullable, vec!["product_id", "trailer_id", "product_cost"]);

        let sql = orders.create_sql();
        assert!(sql.contains("\"product_id\" BIGINT,"));
        assert!(sql.contains("\"customer_id\" BIGINT NOT NULL"));
    }

    #[test]
    fn test_surrogate_keys_are_primary_keys() {
        let schema = Schema::analytics();
        for kind in [
            EntityKind::Customer,
            EntityKind::FuelType,
            EntityKind::Station,
            EntityKind::Product,
            EntityKind::Trailer,
            EntityKind::Order,
        ] {
            let (table, column) = surrogate_key_column(kind).unwrap();
            assert_eq!(schema.get_table(table).unwrap().primary_key_column(), Some(column));
        }
        assert_eq!(surrogate_key_column(EntityKind::CalendarDay), None);
    }
}
