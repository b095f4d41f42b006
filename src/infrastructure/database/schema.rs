//! Minimal table description used to create storage on first use

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
    /// Arbitrary JSON, stored as text in SQL
    Json,
}

impl ColumnType {
    /// Declared SQL type; also drives value decoding on read
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Json => "JSON",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
    pub nullable: bool,
    pub unique: bool,
}

/// A table or collection with its key and unique columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub key: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// New schema keyed by a text `id` column
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: "id".to_string(),
            columns: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn column(mut self, name: impl Into<String>, kind: ColumnType) -> Self {
        self.columns.push(Column {
            name: name.into(),
            kind,
            nullable: true,
            unique: false,
        });
        self
    }

    pub fn required(mut self, name: impl Into<String>, kind: ColumnType) -> Self {
        self.columns.push(Column {
            name: name.into(),
            kind,
            nullable: false,
            unique: false,
        });
        self
    }

    pub fn unique(mut self, name: impl Into<String>, kind: ColumnType) -> Self {
        self.columns.push(Column {
            name: name.into(),
            kind,
            nullable: true,
            unique: true,
        });
        self
    }

    /// Names of every column that must stay unique, key first
    pub fn unique_columns(&self) -> Vec<String> {
        std::iter::once(self.key.clone())
            .chain(
                self.columns
                    .iter()
                    .filter(|c| c.unique && c.name != self.key)
                    .map(|c| c.name.clone()),
            )
            .collect()
    }
}
