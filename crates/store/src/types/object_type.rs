use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Sqlite, Type};

/// Kind of a tree node. Fixed at creation.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectType {
    Root,
    Dir,
    File,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Root => "ROOT",
            ObjectType::Dir => "DIR",
            ObjectType::File => "FILE",
        }
    }

    /// ROOT and DIR nodes may have children.
    pub fn is_container(&self) -> bool {
        matches!(self, ObjectType::Root | ObjectType::Dir)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown object type: {0}")]
pub struct UnknownObjectType(String);

impl FromStr for ObjectType {
    type Err = UnknownObjectType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROOT" => Ok(ObjectType::Root),
            "DIR" => Ok(ObjectType::Dir),
            "FILE" => Ok(ObjectType::File),
            other => Err(UnknownObjectType(other.to_string())),
        }
    }
}

impl Decode<'_, Sqlite> for ObjectType {
    fn decode(value: SqliteValueRef<'_>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Sqlite>>::decode(value)?;
        Ok(s.parse()?)
    }
}

impl Encode<'_, Sqlite> for ObjectType {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'_>>,
    ) -> Result<IsNull, BoxDynError> {
        args.push(SqliteArgumentValue::Text(self.as_str().into()));
        Ok(IsNull::No)
    }
}

impl Type<Sqlite> for ObjectType {
    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }

    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}
