use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared storage type of a scalar column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[serde(alias = "int", alias = "smallint", alias = "tinyint", alias = "mediumint")]
    Integer,
    #[serde(alias = "bigint", alias = "bigInteger")]
    BigInteger,
    #[serde(alias = "double", alias = "real")]
    Float,
    #[serde(alias = "numeric")]
    Decimal,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "varchar", alias = "char")]
    String,
    #[serde(alias = "longtext", alias = "mediumtext")]
    Text,
    Uuid,
    Json,
    #[serde(alias = "blob")]
    Binary,
    Date,
    #[serde(alias = "datetime", alias = "dateTime")]
    DateTime,
    Timestamp,
    Time,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::BigInteger | ColumnType::Float | ColumnType::Decimal
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ColumnType::Date | ColumnType::DateTime | ColumnType::Timestamp | ColumnType::Time
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColumnType::Integer => "integer",
            ColumnType::BigInteger => "big_integer",
            ColumnType::Float => "float",
            ColumnType::Decimal => "decimal",
            ColumnType::Boolean => "boolean",
            ColumnType::String => "string",
            ColumnType::Text => "text",
            ColumnType::Uuid => "uuid",
            ColumnType::Json => "json",
            ColumnType::Binary => "binary",
            ColumnType::Date => "date",
            ColumnType::DateTime => "date_time",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Time => "time",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Which side of a relation holds the foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// FK column on this table pointing at the target primary key.
    #[serde(alias = "many_to_one", alias = "belongsTo", alias = "manyToOne")]
    BelongsTo,
    /// FK column on the target table pointing at this primary key, at most one row.
    #[serde(alias = "hasOne")]
    HasOne,
    /// FK column on the target table pointing at this primary key.
    #[serde(alias = "one_to_many", alias = "hasMany", alias = "oneToMany")]
    HasMany,
    /// Rows linked through a junction table.
    #[serde(alias = "manyToMany")]
    ManyToMany,
}

/// Junction table backing a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionMeta {
    pub table: String,
    /// Junction column holding the owning table's primary key.
    #[serde(alias = "sourceKey")]
    pub source_key: String,
    /// Junction column holding the target table's primary key.
    #[serde(alias = "targetKey")]
    pub target_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationMeta {
    pub property: String,
    pub cardinality: Cardinality,
    #[serde(alias = "targetTable")]
    pub target_table: String,
    #[serde(default, alias = "joinKey")]
    pub join_key: Option<String>,
    #[serde(default, alias = "inverseProperty")]
    pub inverse_property: Option<String>,
    #[serde(default)]
    pub junction: Option<JunctionMeta>,
}

impl RelationMeta {
    pub fn belongs_to(
        property: impl Into<String>,
        target_table: impl Into<String>,
        join_key: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            cardinality: Cardinality::BelongsTo,
            target_table: target_table.into(),
            join_key: Some(join_key.into()),
            inverse_property: None,
            junction: None,
        }
    }

    pub fn has_many(
        property: impl Into<String>,
        target_table: impl Into<String>,
        inverse_property: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            cardinality: Cardinality::HasMany,
            target_table: target_table.into(),
            join_key: None,
            inverse_property: Some(inverse_property.into()),
            junction: None,
        }
    }

    pub fn many_to_many(
        property: impl Into<String>,
        target_table: impl Into<String>,
        junction: JunctionMeta,
    ) -> Self {
        Self {
            property: property.into(),
            cardinality: Cardinality::ManyToMany,
            target_table: target_table.into(),
            join_key: None,
            inverse_property: None,
            junction: Some(junction),
        }
    }

    pub fn with_join_key(mut self, join_key: impl Into<String>) -> Self {
        self.join_key = Some(join_key.into());
        self
    }

    pub fn with_inverse(mut self, inverse_property: impl Into<String>) -> Self {
        self.inverse_property = Some(inverse_property.into());
        self
    }

    /// Joining this relation can fan a single parent row out into many.
    pub fn is_to_many(&self) -> bool {
        matches!(self.cardinality, Cardinality::HasMany | Cardinality::ManyToMany)
    }
}

/// Metadata of one logical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    #[serde(alias = "primaryKey")]
    pub primary_key: String,
    #[serde(default)]
    pub columns: Vec<ColumnMeta>,
    #[serde(default)]
    pub relations: Vec<RelationMeta>,
}

impl TableMeta {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnMeta::new(name, column_type));
        self
    }

    pub fn relation(mut self, relation: RelationMeta) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn find_relation(&self, property: &str) -> Option<&RelationMeta> {
        self.relations.iter().find(|r| r.property == property)
    }
}
