//! Declared record types. Pure data; the planner validates descriptors
//! against these before any data is touched.

use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::path::FieldPath;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int64,
    Decimal,
    Utf8,
    Date,
    Struct(Schema),
    List(Box<DataType>),
}

impl DataType {
    /// Sequence of records with the given element schema.
    pub fn list_of(element: Schema) -> Self {
        DataType::List(Box::new(DataType::Struct(element)))
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, DataType::Struct(_) | DataType::List(_))
    }

    /// Types that accept `gt`/`gte`/`lt`/`lte` and `min`/`max`.
    pub fn is_orderable(&self) -> bool {
        matches!(
            self,
            DataType::Int64 | DataType::Decimal | DataType::Utf8 | DataType::Date
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Decimal)
    }

    /// Element schema when this is a sequence of records.
    pub fn element_schema(&self) -> Option<&Schema> {
        match self {
            DataType::List(inner) => match inner.as_ref() {
                DataType::Struct(schema) => Some(schema),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn name(&self) -> String {
        match self {
            DataType::Boolean => "bool".into(),
            DataType::Int64 => "int".into(),
            DataType::Decimal => "decimal".into(),
            DataType::Utf8 => "string".into(),
            DataType::Date => "date".into(),
            DataType::Struct(_) => "record".into(),
            DataType::List(inner) => format!("list<{}>", inner.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_named(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolve `path` through nested structs.
    ///
    /// Paths never cross a sequence: reaching a list before the last segment
    /// is a type mismatch, a missing segment is an unknown path.
    pub fn resolve(&self, path: &FieldPath) -> Result<&Field, CompileError> {
        if !path.is_well_formed() {
            return Err(CompileError::unknown(path));
        }
        let (last, parents) = path
            .segments()
            .split_last()
            .ok_or_else(|| CompileError::unknown(path))?;
        let mut cur = self;
        for seg in parents {
            let field = cur
                .field_named(seg)
                .ok_or_else(|| CompileError::unknown(path))?;
            cur = match &field.data_type {
                DataType::Struct(inner) => inner,
                other => {
                    return Err(CompileError::FieldTypeMismatch {
                        path: path.to_string(),
                        detail: format!("segment '{seg}' is {}, not a record", other.name()),
                    })
                }
            };
        }
        cur.field_named(last)
            .ok_or_else(|| CompileError::unknown(path))
    }

    /// Resolve `path` and require a scalar type.
    pub fn resolve_scalar(&self, path: &FieldPath) -> Result<&Field, CompileError> {
        let field = self.resolve(path)?;
        if !field.data_type.is_scalar() {
            return Err(CompileError::FieldTypeMismatch {
                path: path.to_string(),
                detail: format!("expected a scalar field, found {}", field.data_type.name()),
            });
        }
        Ok(field)
    }

    /// Add `field` at `parent` (empty for top level), creating intermediate
    /// structs as needed. Used to build GroupResult schemas from key paths.
    pub fn insert_at(&mut self, parent: &[String], field: Field) {
        let Some((head, rest)) = parent.split_first() else {
            match self.fields.iter_mut().find(|f| f.name == field.name) {
                Some(slot) => *slot = field,
                None => self.fields.push(field),
            }
            return;
        };
        if !matches!(
            self.field_named(head).map(|f| &f.data_type),
            Some(DataType::Struct(_))
        ) {
            self.fields.retain(|f| f.name != *head);
            self.fields.push(Field::new(
                head.clone(),
                DataType::Struct(Schema::default()),
                true,
            ));
        }
        if let Some(Field {
            data_type: DataType::Struct(inner),
            ..
        }) = self.fields.iter_mut().find(|f| f.name == *head)
        {
            inner.insert_at(rest, field);
        }
    }
}
